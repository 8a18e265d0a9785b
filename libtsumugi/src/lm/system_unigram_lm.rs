use std::collections::HashMap;

use anyhow::Result;
use log::info;

use rsmarisa::{Agent, Keyset, Trie};

/*
   {word}/{yomi}   # in utf-8
   0xff            # marker
   word_id         # u32, little endian
   score           # f32, little endian, log10 確率
*/

/// unigram 言語モデル。
/// 「漢字/かな」に対して、単語 ID と発生確率スコアを保持している。
/// 単語 ID は構築時に密に振られ、bigram モデルのキーになる。
pub struct SystemUnigramLM {
    trie: Trie,
}

#[derive(Default)]
pub struct SystemUnigramLMBuilder {
    data: Vec<(String, f32)>,
}

impl SystemUnigramLMBuilder {
    pub fn add(&mut self, word: &str, score: f32) -> &mut Self {
        self.data.push((word.to_string(), score));
        self
    }

    fn keyset(&self) -> Result<Keyset> {
        let mut keyset = Keyset::new();
        for (word_id, (word, score)) in self.data.iter().enumerate() {
            let key = [
                word.as_bytes(),
                b"\xff", // UTF-8 には 0xff が現れないので区切りに使える
                (word_id as u32).to_le_bytes().as_slice(),
                score.to_le_bytes().as_slice(),
            ]
            .concat();
            keyset.push_back_bytes(&key, 1.0)?;
        }
        Ok(keyset)
    }

    pub fn save(&self, fname: &str) -> Result<()> {
        let mut keyset = self.keyset()?;
        let mut trie = Trie::new();
        trie.build(&mut keyset, 0);
        trie.save(fname)?;
        Ok(())
    }

    pub fn build(&self) -> Result<SystemUnigramLM> {
        let mut keyset = self.keyset()?;
        let mut trie = Trie::new();
        trie.build(&mut keyset, 0);
        Ok(SystemUnigramLM { trie })
    }
}

impl SystemUnigramLM {
    pub fn load(fname: &str) -> Result<SystemUnigramLM> {
        info!("Loading system-unigram: {}", fname);
        let mut trie = Trie::new();
        trie.load(fname)?;
        Ok(SystemUnigramLM { trie })
    }

    pub fn num_keys(&self) -> usize {
        self.trie.num_keys()
    }

    /// @return (word_id, score)。未知語は None。
    pub fn find_unigram(&self, word: &str) -> Option<(i32, f32)> {
        debug_assert!(!word.is_empty());

        let mut query = word.as_bytes().to_vec();
        query.push(0xff);
        let mut agent = Agent::new();
        agent.set_query_bytes(&query);

        if self.trie.predictive_search(&mut agent) {
            let entry = agent.key().as_bytes();
            if let Some(idx) = entry.iter().position(|f| *f == 0xff) {
                let tail = &entry[idx + 1..];
                if tail.len() == 8 {
                    let word_id = u32::from_le_bytes(tail[0..4].try_into().unwrap());
                    let score = f32::from_le_bytes(tail[4..8].try_into().unwrap());
                    return Some((word_id as i32, score));
                }
            }
        }
        None
    }

    pub fn as_hash_map(&self) -> HashMap<String, (i32, f32)> {
        let mut map = HashMap::new();
        let mut agent = Agent::new();
        agent.set_query_str("");

        while self.trie.predictive_search(&mut agent) {
            let entry = agent.key().as_bytes();
            if let Some(idx) = entry.iter().position(|f| *f == 0xff) {
                let tail = &entry[idx + 1..];
                if tail.len() == 8 {
                    let word = String::from_utf8_lossy(&entry[0..idx]).to_string();
                    let word_id = u32::from_le_bytes(tail[0..4].try_into().unwrap());
                    let score = f32::from_le_bytes(tail[4..8].try_into().unwrap());
                    map.insert(word, (word_id as i32, score));
                }
            }
        }
        map
    }
}
