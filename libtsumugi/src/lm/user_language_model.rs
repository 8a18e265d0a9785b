use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use tempfile::NamedTempFile;

use crate::graph::node::Node;

pub const SAVE_INTERVAL: Duration = Duration::from_secs(60);

// ユーザーの言語モデル。
//
// 確定された文節から unigram/bigram の出現回数を学習し、
// log10(count/total) をスコアとして返す。
#[derive(Default)]
struct UserStats {
    /// 「漢字/かな」がキー。
    unigram: FxHashMap<String, u32>,
    unigram_total: u32,
    /// unigram に出現した読みの集合。
    /// 「この読みをユーザーは知っているか?」に答えるために持つ。
    unigram_yomi: FxHashSet<String>,
    /// 「漢字/かな\t漢字/かな」がキー。
    bigram: FxHashMap<String, u32>,
    /// 左文脈ごとの bigram 回数の合計。
    bigram_prefix_total: FxHashMap<String, u32>,
    dirty: bool,
}

pub struct UserLanguageModel {
    unigram_path: PathBuf,
    bigram_path: PathBuf,
    stats: Mutex<UserStats>,
}

impl UserLanguageModel {
    /// `base_dir` から unigram.txt / bigram.txt を読み込む。
    /// ファイルがない・読めない場合は空のモデルとして始める。
    pub fn load(base_dir: &Path) -> UserLanguageModel {
        let unigram_path = base_dir.join("unigram.txt");
        let bigram_path = base_dir.join("bigram.txt");

        let mut stats = UserStats::default();
        match fs::read_to_string(&unigram_path) {
            Ok(content) => Self::read_unigram(&mut stats, &content),
            Err(err) => {
                info!(
                    "Starting with an empty user unigram model ({:?}): {}",
                    unigram_path, err
                );
            }
        }
        match fs::read_to_string(&bigram_path) {
            Ok(content) => Self::read_bigram(&mut stats, &content),
            Err(err) => {
                info!(
                    "Starting with an empty user bigram model ({:?}): {}",
                    bigram_path, err
                );
            }
        }

        UserLanguageModel {
            unigram_path,
            bigram_path,
            stats: Mutex::new(stats),
        }
    }

    /// `"{word}/{yomi} {count}"` を 1 行ずつ読む。
    /// 旧形式の `"{word}/{yomi}\t{count}"` も受け付ける。壊れた行は無視。
    fn read_unigram(stats: &mut UserStats, content: &str) {
        for line in content.lines() {
            let Some((key, count)) = split_key_and_count(line) else {
                warn!("Skipping a malformed user unigram line: {:?}", line);
                continue;
            };
            let Some((_, yomi)) = key.rsplit_once('/') else {
                warn!("Skipping a user unigram line without yomi: {:?}", line);
                continue;
            };
            stats.unigram_yomi.insert(yomi.to_string());
            stats.unigram.insert(key.to_string(), count);
            stats.unigram_total += count;
        }
    }

    /// `"{key1}\t{key2} {count}"` を 1 行ずつ読む。
    /// 旧形式の `"{key1}\t{key2}\t{count}"` も受け付ける。壊れた行は無視。
    fn read_bigram(stats: &mut UserStats, content: &str) {
        for line in content.lines() {
            let Some((key, count)) = split_key_and_count(line) else {
                warn!("Skipping a malformed user bigram line: {:?}", line);
                continue;
            };
            let Some((key1, _)) = key.split_once('\t') else {
                warn!("Skipping a user bigram line without a separator: {:?}", line);
                continue;
            };
            *stats.bigram_prefix_total.entry(key1.to_string()).or_insert(0) += count;
            stats.bigram.insert(key.to_string(), count);
        }
    }

    /// 確定された文節リストを学習する。
    pub fn add_entry(&self, nodes: &[Node]) {
        let mut stats = self.stats.lock().unwrap();

        // unigram
        for node in nodes {
            let key = node.key();
            debug!("add user_language_model entry: key={}", key);

            stats.unigram_yomi.insert(node.yomi.clone());
            *stats.unigram.entry(key.to_string()).or_insert(0) += 1;
            stats.unigram_total += 1;
        }

        // bigram
        for pair in nodes.windows(2) {
            let key = format!("{}\t{}", pair[0].key(), pair[1].key());
            *stats.bigram.entry(key).or_insert(0) += 1;
            *stats
                .bigram_prefix_total
                .entry(pair[0].key().to_string())
                .or_insert(0) += 1;
        }

        stats.dirty = true;
    }

    pub fn get_unigram_cost(&self, key: &str) -> Option<f32> {
        let stats = self.stats.lock().unwrap();
        let count = *stats.unigram.get(key)?;
        Some((count as f64 / stats.unigram_total as f64).log10() as f32)
    }

    pub fn has_unigram_cost_by_yomi(&self, yomi: &str) -> bool {
        self.stats.lock().unwrap().unigram_yomi.contains(yomi)
    }

    pub fn get_bigram_cost(&self, key1: &str, key2: &str) -> Option<f32> {
        let stats = self.stats.lock().unwrap();
        let mut key = String::with_capacity(key1.len() + 1 + key2.len());
        key.push_str(key1);
        key.push('\t');
        key.push_str(key2);
        let count = *stats.bigram.get(key.as_str())?;
        let total = *stats.bigram_prefix_total.get(key1)?;
        Some((count as f64 / total as f64).log10() as f32)
    }

    /// dirty な場合のみ、unigram/bigram をソートしてアトミックに書き出す。
    /// スナップショットの取得中だけロックを持ち、書き込みはロック外で行う。
    /// 失敗したら dirty を立て直して次の保存で再試行する。
    pub fn save(&self) -> Result<()> {
        let (unigram_content, bigram_content) = {
            let mut stats = self.stats.lock().unwrap();
            if !stats.dirty {
                debug!("Skip saving user language model.");
                return Ok(());
            }
            stats.dirty = false;
            (
                serialize_counts(&stats.unigram),
                serialize_counts(&stats.bigram),
            )
        };

        let result = write_atomically(&self.unigram_path, &unigram_content)
            .and_then(|_| write_atomically(&self.bigram_path, &bigram_content));
        match result {
            Ok(_) => {
                info!("Saved user language model: {:?}", self.unigram_path);
                Ok(())
            }
            Err(err) => {
                self.stats.lock().unwrap().dirty = true;
                Err(err)
            }
        }
    }

    pub fn unigram_path(&self) -> &Path {
        &self.unigram_path
    }

    pub fn bigram_path(&self) -> &Path {
        &self.bigram_path
    }

    #[cfg(test)]
    fn snapshot(&self) -> (FxHashMap<String, u32>, u32, FxHashMap<String, u32>, FxHashMap<String, u32>) {
        let stats = self.stats.lock().unwrap();
        (
            stats.unigram.clone(),
            stats.unigram_total,
            stats.bigram.clone(),
            stats.bigram_prefix_total.clone(),
        )
    }
}

fn split_key_and_count(line: &str) -> Option<(&str, u32)> {
    // 新形式はキーとカウントを半角スペースで区切る。
    if let Some((key, count)) = line.rsplit_once(' ') {
        if let Ok(count) = count.parse::<u32>() {
            return Some((key, count));
        }
    }
    // 旧形式はタブ区切り。
    let (key, count) = line.rsplit_once('\t')?;
    let count = count.parse::<u32>().ok()?;
    Some((key, count))
}

fn serialize_counts(counts: &FxHashMap<String, u32>) -> String {
    let mut keys: Vec<&String> = counts.keys().collect();
    keys.sort();
    let mut buf = String::new();
    for key in keys {
        buf.push_str(key);
        buf.push(' ');
        buf.push_str(&counts[key].to_string());
        buf.push('\n');
    }
    buf
}

fn write_atomically(path: &Path, content: &str) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("Cannot get the parent directory of {:?}", path))?;
    fs::create_dir_all(dir)?;
    let mut tmpfile = NamedTempFile::new_in(dir)?;
    tmpfile.write_all(content.as_bytes())?;
    tmpfile
        .persist(path)
        .with_context(|| format!("Cannot persist {:?}", path))?;
    Ok(())
}

/// 定期保存スレッドを起動する。プロセスと運命をともにする。
pub fn spawn_periodic_save(model: Arc<UserLanguageModel>) -> thread::JoinHandle<()> {
    thread::spawn(move || loop {
        if let Err(err) = model.save() {
            error!("Cannot save the user language model: {}", err);
        }
        thread::sleep(SAVE_INTERVAL);
    })
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn node(word: &str, yomi: &str) -> Node {
        Node::new(0, word, yomi, None)
    }

    #[test]
    fn test_unigram_counts() {
        let tmpdir = TempDir::new().unwrap();
        let model = UserLanguageModel::load(tmpdir.path());
        model.add_entry(&[node("単語", "たんご")]);
        model.add_entry(&[node("単語", "たんご")]);
        model.add_entry(&[node("熟語", "じゅくご")]);

        let (unigram, total, _, _) = model.snapshot();
        assert_eq!(unigram.get("単語/たんご"), Some(&2));
        assert_eq!(unigram.get("熟語/じゅくご"), Some(&1));
        assert_eq!(total, 3);
        assert!(
            model.get_unigram_cost("単語/たんご").unwrap()
                > model.get_unigram_cost("熟語/じゅくご").unwrap()
        );
    }

    #[test]
    fn test_unigram_yomi() {
        let tmpdir = TempDir::new().unwrap();
        let model = UserLanguageModel::load(tmpdir.path());
        model.add_entry(&[node("ヒョイー", "ひょいー")]);

        assert!(model.has_unigram_cost_by_yomi("ひょいー"));
        assert!(!model.has_unigram_cost_by_yomi("ほげ"));
    }

    #[test]
    fn test_bigram_counts() {
        let tmpdir = TempDir::new().unwrap();
        let model = UserLanguageModel::load(tmpdir.path());
        model.add_entry(&[node("私", "わたし"), node("だよ", "だよ")]);
        model.add_entry(&[
            node("それは", "それは"),
            node("私", "わたし"),
            node("だよ", "だよ"),
        ]);
        model.add_entry(&[node("私", "わたし"), node("です", "です")]);

        let (unigram, total, bigram, bigram_prefix_total) = model.snapshot();
        assert_eq!(unigram.get("私/わたし"), Some(&3));
        assert_eq!(unigram.get("だよ/だよ"), Some(&2));
        assert_eq!(total, 7);

        assert_eq!(bigram.get("それは/それは\t私/わたし"), Some(&1));
        assert_eq!(bigram.get("私/わたし\tだよ/だよ"), Some(&2));
        assert_eq!(bigram.get("私/わたし\tです/です"), Some(&1));
        assert_eq!(bigram_prefix_total.get("それは/それは"), Some(&1));
        assert_eq!(bigram_prefix_total.get("私/わたし"), Some(&3));

        assert!(
            model.get_bigram_cost("私/わたし", "だよ/だよ").unwrap()
                > model.get_bigram_cost("私/わたし", "です/です").unwrap()
        );
        assert_eq!(model.get_bigram_cost("だよ/だよ", "です/です"), None);
    }

    #[test]
    fn test_add_entry_totals() {
        // add_entry は unigram 合計を len(nodes)、bigram 合計を len(nodes)-1 増やす。
        let tmpdir = TempDir::new().unwrap();
        let model = UserLanguageModel::load(tmpdir.path());
        model.add_entry(&[
            node("今日", "きょう"),
            node("は", "は"),
            node("晴れ", "はれ"),
        ]);

        let (unigram, total, bigram, _) = model.snapshot();
        assert_eq!(unigram.values().sum::<u32>(), 3);
        assert_eq!(total, 3);
        assert_eq!(bigram.values().sum::<u32>(), 2);
    }

    #[test]
    fn test_save_and_reload_round_trip() -> Result<()> {
        let tmpdir = TempDir::new().unwrap();
        let model = UserLanguageModel::load(tmpdir.path());
        model.add_entry(&[node("私", "わたし"), node("です", "です")]);
        model.add_entry(&[node("私", "わたし")]);
        model.save()?;

        let reloaded = UserLanguageModel::load(tmpdir.path());
        let (unigram, total, bigram, bigram_prefix_total) = reloaded.snapshot();
        let (orig_unigram, orig_total, orig_bigram, orig_prefix_total) = model.snapshot();
        assert_eq!(unigram, orig_unigram);
        assert_eq!(total, orig_total);
        assert_eq!(bigram, orig_bigram);
        assert_eq!(bigram_prefix_total, orig_prefix_total);
        assert!(reloaded.has_unigram_cost_by_yomi("わたし"));
        Ok(())
    }

    #[test]
    fn test_save_skips_when_clean() -> Result<()> {
        let tmpdir = TempDir::new().unwrap();
        let model = UserLanguageModel::load(tmpdir.path());
        model.save()?;
        // dirty でなければファイルは作られない。
        assert!(!model.unigram_path().exists());
        Ok(())
    }

    #[test]
    fn test_read_legacy_and_malformed_lines() {
        let tmpdir = TempDir::new().unwrap();
        fs::write(
            tmpdir.path().join("unigram.txt"),
            "私/わたし\t3\nこわれたぎょう\nです/です 1\n",
        )
        .unwrap();
        fs::write(
            tmpdir.path().join("bigram.txt"),
            "私/わたし\tです/です\t2\nこわれたぎょう\n",
        )
        .unwrap();

        let model = UserLanguageModel::load(tmpdir.path());
        let (unigram, total, bigram, bigram_prefix_total) = model.snapshot();
        assert_eq!(unigram.get("私/わたし"), Some(&3));
        assert_eq!(unigram.get("です/です"), Some(&1));
        assert_eq!(total, 4);
        assert_eq!(bigram.get("私/わたし\tです/です"), Some(&2));
        assert_eq!(bigram_prefix_total.get("私/わたし"), Some(&2));
    }
}
