use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// エンジンの設定。YAML で書く。
///
/// ```yaml
/// model_dir: /usr/share/tsumugi/model
/// dicts:
///   - path: /usr/share/skk/SKK-JISYO.L
///     encoding: euc_jp
///     usage: normal
/// romaji:
///   "wo": "うぉ"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// unigram.trie / bigram.trie / system_dict.trie / single_term.trie を置くディレクトリ。
    pub model_dir: String,
    /// 追加の辞書。
    #[serde(default)]
    pub dicts: Vec<DictConfig>,
    /// ユーザー言語モデルの保存先。未指定なら XDG データディレクトリ。
    #[serde(default)]
    pub user_data_dir: Option<String>,
    /// ローマ字テーブルへの追加エントリー。デフォルトテーブルを上書きする。
    #[serde(default)]
    pub romaji: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DictConfig {
    /// `.trie` ならビルド済みバイナリ辞書、それ以外は SKK 形式のテキスト。
    pub path: String,
    #[serde(default)]
    pub encoding: DictEncoding,
    #[serde(default)]
    pub usage: DictUsage,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DictEncoding {
    #[default]
    Utf8,
    EucJp,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DictUsage {
    /// 通常の変換に使う。
    #[default]
    Normal,
    /// 変換範囲全体が一致したときだけ使う（絵文字・記号など）。
    SingleTerm,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<EngineConfig> {
        let file =
            File::open(path).with_context(|| format!("Cannot open config file: {:?}", path))?;
        let config: EngineConfig = serde_yaml::from_reader(file)
            .with_context(|| format!("Cannot parse config file: {:?}", path))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_load() -> Result<()> {
        let mut tmpfile = NamedTempFile::new()?;
        writeln!(tmpfile, "model_dir: /tmp/model")?;
        writeln!(tmpfile, "dicts:")?;
        writeln!(tmpfile, "  - path: /tmp/SKK-JISYO.emoji")?;
        writeln!(tmpfile, "    usage: single_term")?;
        writeln!(tmpfile, "romaji:")?;
        writeln!(tmpfile, "  \"wo\": \"うぉ\"")?;
        tmpfile.flush()?;

        let config = EngineConfig::load(tmpfile.path())?;
        assert_eq!(config.model_dir, "/tmp/model");
        assert_eq!(config.dicts.len(), 1);
        assert_eq!(config.dicts[0].usage, DictUsage::SingleTerm);
        assert_eq!(config.dicts[0].encoding, DictEncoding::Utf8);
        assert_eq!(config.romaji.get("wo"), Some(&"うぉ".to_string()));
        Ok(())
    }
}
