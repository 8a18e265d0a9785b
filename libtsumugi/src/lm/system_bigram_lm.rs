use std::collections::HashMap;

use anyhow::Result;
use log::{info, warn};

use rsmarisa::{Agent, Keyset, Trie};

/*
   {word1 ID}    # u32, little endian
   {word2 ID}    # u32, little endian
   score         # f32, little endian, log10 確率
*/

/// bigram 言語モデル。
/// unigram の生成のときに得られた単語 ID のペアをキーにすることで圧縮している。
/// 学習パイプラインは実在する bigram に log10 確率 0.0 を出力しないので、
/// 0.0 は「エントリーなし」の番兵として扱う。
pub struct SystemBigramLM {
    trie: Trie,
}

pub struct SystemBigramLMBuilder {
    keyset: Keyset,
}

impl Default for SystemBigramLMBuilder {
    fn default() -> Self {
        Self {
            keyset: Keyset::new(),
        }
    }
}

impl SystemBigramLMBuilder {
    pub fn add(&mut self, word_id1: i32, word_id2: i32, score: f32) -> Result<&mut Self> {
        let mut key: Vec<u8> = Vec::with_capacity(12);
        key.extend((word_id1 as u32).to_le_bytes());
        key.extend((word_id2 as u32).to_le_bytes());
        key.extend(score.to_le_bytes());
        self.keyset.push_back_bytes(&key, 1.0)?;
        Ok(self)
    }

    pub fn build(&mut self) -> Result<SystemBigramLM> {
        let mut trie = Trie::new();
        trie.build(&mut self.keyset, 0);
        Ok(SystemBigramLM { trie })
    }

    pub fn save(&mut self, ofname: &str) -> Result<()> {
        let mut trie = Trie::new();
        trie.build(&mut self.keyset, 0);
        trie.save(ofname)?;
        Ok(())
    }
}

impl SystemBigramLM {
    pub fn load(filename: &str) -> Result<SystemBigramLM> {
        info!("Loading system-bigram: {}", filename);
        let mut trie = Trie::new();
        trie.load(filename)?;
        Ok(SystemBigramLM { trie })
    }

    pub fn num_keys(&self) -> usize {
        self.trie.num_keys()
    }

    /**
     * edge cost を得る。
     * この ID は、unigram の trie でふられたもの。
     * エントリーがない場合と番兵 0.0 の場合は None。
     */
    pub fn find_bigram(&self, word_id1: i32, word_id2: i32) -> Option<f32> {
        let id1_bytes = (word_id1 as u32).to_le_bytes();
        let id2_bytes = (word_id2 as u32).to_le_bytes();
        let mut key = [0u8; 8];
        key[0..4].copy_from_slice(&id1_bytes);
        key[4..8].copy_from_slice(&id2_bytes);

        let mut agent = Agent::new();
        agent.set_query_bytes(&key);

        if self.trie.predictive_search(&mut agent) {
            let entry = agent.key().as_bytes();
            if entry.len() != 12 {
                warn!("Malformed bigram entry: len={}", entry.len());
                return None;
            }
            let score = f32::from_le_bytes(entry[8..12].try_into().unwrap());
            if score == 0.0 {
                return None;
            }
            return Some(score);
        }

        None
    }

    pub fn as_hash_map(&self) -> HashMap<(i32, i32), f32> {
        let mut map: HashMap<(i32, i32), f32> = HashMap::new();
        let mut agent = Agent::new();
        agent.set_query_str("");

        while self.trie.predictive_search(&mut agent) {
            let entry = agent.key().as_bytes();
            if entry.len() == 12 {
                let word_id1 = u32::from_le_bytes(entry[0..4].try_into().unwrap()) as i32;
                let word_id2 = u32::from_le_bytes(entry[4..8].try_into().unwrap()) as i32;
                let score = f32::from_le_bytes(entry[8..12].try_into().unwrap());
                map.insert((word_id1, word_id2), score);
            }
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn test_build_and_find() -> Result<()> {
        let mut builder = SystemBigramLMBuilder::default();
        builder.add(4649, 5963, -5.11)?;
        let lm = builder.build()?;

        let got_score = lm.find_bigram(4649, 5963).unwrap();
        assert_eq!(got_score, -5.11_f32);
        assert_eq!(lm.find_bigram(5963, 4649), None);

        let map = lm.as_hash_map();
        assert_eq!(*map.get(&(4649, 5963)).unwrap(), -5.11_f32);
        Ok(())
    }

    #[test]
    fn test_zero_score_is_a_miss() -> Result<()> {
        let mut builder = SystemBigramLMBuilder::default();
        builder.add(1, 2, 0.0)?;
        let lm = builder.build()?;
        assert_eq!(lm.find_bigram(1, 2), None);
        Ok(())
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let named_tmpfile = NamedTempFile::new()?;
        let tmpfile = named_tmpfile.path().to_str().unwrap().to_string();

        let mut builder = SystemBigramLMBuilder::default();
        builder.add(1, 2, -0.5)?;
        builder.add(2, 3, -1.5)?;
        builder.save(&tmpfile)?;

        let lm = SystemBigramLM::load(&tmpfile)?;
        assert_eq!(lm.find_bigram(1, 2), Some(-0.5));
        assert_eq!(lm.find_bigram(2, 3), Some(-1.5));
        assert_eq!(lm.find_bigram(3, 4), None);
        Ok(())
    }
}
