use anyhow::{anyhow, Result};
use log::{info, trace};

use rsmarisa::{Agent, Keyset, Trie};

// 辞書トライのキーは「読み \t 表層1/表層2/...」。
// 表層のリストは登録順を保存し、`/` は表層に出現しない前提。

/// 読み→表層リストの読み取り専用辞書。
///
/// 本体は静的トライ 1 本。`prefixes()` のために、読みだけを集めた
/// インメモリのトライを構築時に併設する。
pub struct BinaryDict {
    trie: Trie,
    kana_trie: crawdad::Trie,
}

impl BinaryDict {
    pub fn build(entries: &[(String, Vec<String>)]) -> Result<BinaryDict> {
        let mut keyset = Self::build_keyset(entries)?;
        let mut trie = Trie::new();
        trie.build(&mut keyset, 0);
        Self::from_trie(trie)
    }

    pub fn build_and_save(entries: &[(String, Vec<String>)], path: &str) -> Result<BinaryDict> {
        let mut keyset = Self::build_keyset(entries)?;
        let mut trie = Trie::new();
        trie.build(&mut keyset, 0);
        trie.save(path)?;
        info!("Saved dictionary: {}", path);
        Self::from_trie(trie)
    }

    pub fn load(path: &str) -> Result<BinaryDict> {
        info!("Loading dictionary: {}", path);
        let mut trie = Trie::new();
        trie.load(path)?;
        Self::from_trie(trie)
    }

    fn build_keyset(entries: &[(String, Vec<String>)]) -> Result<Keyset> {
        // 同じ読みが複数回来たら 1 エントリーにまとめる。登録順優先で重複排除。
        let mut yomis: Vec<&str> = Vec::new();
        let mut merged: Vec<Vec<&str>> = Vec::new();
        for (yomi, surfaces) in entries {
            let idx = match yomis.iter().position(|y| y == yomi) {
                Some(idx) => idx,
                None => {
                    yomis.push(yomi);
                    merged.push(Vec::new());
                    yomis.len() - 1
                }
            };
            for surface in surfaces {
                if !merged[idx].contains(&surface.as_str()) {
                    merged[idx].push(surface);
                }
            }
        }

        let mut keyset = Keyset::new();
        for (yomi, surfaces) in yomis.iter().zip(merged.iter()) {
            let entry = format!("{}\t{}", yomi, surfaces.join("/"));
            keyset.push_back_str(&entry)?;
        }
        Ok(keyset)
    }

    fn from_trie(trie: Trie) -> Result<BinaryDict> {
        let kana_trie = Self::build_kana_trie(&trie)?;
        Ok(BinaryDict { trie, kana_trie })
    }

    fn build_kana_trie(trie: &Trie) -> Result<crawdad::Trie> {
        let mut yomis = Self::yomis_from_trie(trie);
        yomis.sort();
        yomis.dedup();
        if yomis.is_empty() {
            // crawdad は空のキー集合を受け付けない。問い合わせにかすらない
            // ダミーキーを 1 本入れておく。
            yomis.push("\t\t".to_string());
        }
        crawdad::Trie::from_keys(&yomis)
            .map_err(|e| anyhow!("Cannot build kana trie for dictionary: {}", e))
    }

    fn yomis_from_trie(trie: &Trie) -> Vec<String> {
        let mut yomis: Vec<String> = Vec::new();
        let mut agent = Agent::new();
        agent.set_query_str("");

        while trie.predictive_search(&mut agent) {
            let word = agent.key().as_bytes();
            if let Some(idx) = word.iter().position(|f| *f == b'\t') {
                yomis.push(String::from_utf8_lossy(&word[0..idx]).to_string());
            }
        }
        yomis
    }

    pub fn yomis(&self) -> Vec<String> {
        Self::yomis_from_trie(&self.trie)
    }

    pub fn num_keys(&self) -> usize {
        self.trie.num_keys()
    }

    /// `yomi` の接頭辞になっている登録済みの読みをすべて返す。
    /// `yomi` 自身が登録されていればそれも含む。
    pub fn prefixes(&self, yomi: &str) -> Vec<String> {
        let haystack: Vec<char> = yomi.chars().collect();
        let mut result = Vec::new();
        for (_, chars_matched) in self.kana_trie.common_prefix_search(haystack.iter().copied()) {
            let end = yomi
                .char_indices()
                .nth(chars_matched)
                .map(|(offset, _)| offset)
                .unwrap_or(yomi.len());
            result.push(yomi[0..end].to_string());
        }
        result
    }

    /// 完全一致する読みの表層リストを登録順で返す。
    pub fn find_words(&self, yomi: &str) -> Vec<String> {
        let mut surfaces: Vec<String> = Vec::new();
        let query = format!("{}\t", yomi);
        let mut agent = Agent::new();
        agent.set_query_str(&query);

        if self.trie.predictive_search(&mut agent) {
            let word = agent.key().as_bytes();
            if let Some(idx) = word.iter().position(|f| *f == b'\t') {
                let joined = String::from_utf8_lossy(&word[idx + 1..]).to_string();
                for surface in joined.split('/') {
                    surfaces.push(surface.to_string());
                }
            }
        }

        trace!("find_words: {:?} -> {:?}", yomi, surfaces);
        surfaces
    }
}

#[cfg(test)]
mod tests {
    use tempfile::NamedTempFile;

    use super::*;

    fn entries() -> Vec<(String, Vec<String>)> {
        vec![
            (
                "わたし".to_string(),
                vec!["私".to_string(), "渡し".to_string()],
            ),
            ("わた".to_string(), vec!["綿".to_string()]),
            ("たなか".to_string(), vec!["田中".to_string()]),
        ]
    }

    #[test]
    fn test_find_words() -> Result<()> {
        let dict = BinaryDict::build(&entries())?;
        assert_eq!(
            dict.find_words("わたし"),
            vec!["私".to_string(), "渡し".to_string()]
        );
        assert_eq!(dict.find_words("たなか"), vec!["田中".to_string()]);
        assert!(dict.find_words("ほげ").is_empty());
        Ok(())
    }

    #[test]
    fn test_prefixes() -> Result<()> {
        let dict = BinaryDict::build(&entries())?;
        assert_eq!(
            dict.prefixes("わたしのなまえ"),
            vec!["わた".to_string(), "わたし".to_string()]
        );
        // 読み自身も接頭辞として返る。
        assert_eq!(
            dict.prefixes("わたし"),
            vec!["わた".to_string(), "わたし".to_string()]
        );
        assert!(dict.prefixes("なまえ").is_empty());
        Ok(())
    }

    #[test]
    fn test_duplicated_surfaces_are_merged() -> Result<()> {
        let dict = BinaryDict::build(&[
            ("す".to_string(), vec!["酢".to_string(), "巣".to_string()]),
            ("す".to_string(), vec!["酢".to_string(), "素".to_string()]),
        ])?;
        assert_eq!(
            dict.find_words("す"),
            vec!["酢".to_string(), "巣".to_string(), "素".to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let tmpfile = NamedTempFile::new()?;
        let path = tmpfile.path().to_str().unwrap().to_string();

        BinaryDict::build_and_save(&entries(), &path)?;
        let dict = BinaryDict::load(&path)?;
        assert_eq!(
            dict.find_words("わたし"),
            vec!["私".to_string(), "渡し".to_string()]
        );
        assert_eq!(
            dict.prefixes("わたしの"),
            vec!["わた".to_string(), "わたし".to_string()]
        );
        Ok(())
    }

    #[test]
    fn test_empty_dict() -> Result<()> {
        let dict = BinaryDict::build(&[])?;
        assert!(dict.find_words("わたし").is_empty());
        assert!(dict.prefixes("わたし").is_empty());
        Ok(())
    }
}
