use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};

use log::warn;

use crate::lisp;

pub const BOS_TOKEN_KEY: &str = "__BOS__/__BOS__";
// EOS のキーにはわざと読みを付けない。EOS を含むバイグラムは参照しない。
pub const EOS_TOKEN_KEY: &str = "__EOS__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Bos,
    Eos,
    Word,
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// 読みの開始位置。コードポイント単位。
    pub start_pos: i32,
    /// 表層。
    pub word: String,
    /// 読み仮名
    pub yomi: String,
    /// システム unigram の (word_id, スコア)。未知語は None。
    pub word_id_and_score: Option<(i32, f32)>,
    /// "word/yomi" のキャッシュ
    cached_key: String,
}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.start_pos.hash(state);
        self.word.hash(state);
        self.yomi.hash(state);
    }
}

impl PartialEq<Self> for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.start_pos == other.start_pos
            && self.word == other.word
            && self.yomi == other.yomi
    }
}

impl Eq for Node {}

impl Node {
    pub fn new(
        start_pos: i32,
        word: &str,
        yomi: &str,
        word_id_and_score: Option<(i32, f32)>,
    ) -> Node {
        assert!(!word.is_empty(), "Word shouldn't be empty: {word}/{yomi}");

        Node {
            kind: NodeKind::Word,
            start_pos,
            cached_key: Self::make_key(word, yomi),
            word: word.to_string(),
            yomi: yomi.to_string(),
            word_id_and_score,
        }
    }

    pub(crate) fn create_bos() -> Node {
        Node {
            kind: NodeKind::Bos,
            start_pos: 0,
            word: "__BOS__".to_string(),
            yomi: "__BOS__".to_string(),
            word_id_and_score: None,
            cached_key: BOS_TOKEN_KEY.to_string(),
        }
    }

    pub(crate) fn create_eos(start_pos: i32) -> Node {
        Node {
            kind: NodeKind::Eos,
            start_pos,
            word: "__EOS__".to_string(),
            yomi: "__EOS__".to_string(),
            word_id_and_score: None,
            cached_key: EOS_TOKEN_KEY.to_string(),
        }
    }

    fn make_key(word: &str, yomi: &str) -> String {
        let mut buf = String::with_capacity(word.len() + 1 + yomi.len());
        buf.push_str(word);
        buf.push('/');
        buf.push_str(yomi);
        buf
    }

    pub fn key(&self) -> &str {
        &self.cached_key
    }

    pub fn is_bos(&self) -> bool {
        self.kind == NodeKind::Bos
    }

    pub fn is_eos(&self) -> bool {
        self.kind == NodeKind::Eos
    }

    /// 読みの終了位置。コードポイント単位。
    pub fn end_pos(&self) -> i32 {
        self.start_pos + self.yomi.chars().count() as i32
    }

    /// 表示用の表層形。`(` で始まる表層は LISP 式として評価する。
    /// 評価に失敗した場合はログを出して素の表層を返す。
    pub fn surface(&self, evaluator: &lisp::Evaluator) -> String {
        if self.word.starts_with('(') {
            match evaluator.run(&self.word) {
                Ok(got) => got,
                Err(err) => {
                    warn!("Cannot evaluate dictionary surface {}: {}", self.word, err);
                    self.word.clone()
                }
            }
        } else {
            self.word.clone()
        }
    }
}

impl Display for Node {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.cached_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key() {
        let node = Node::new(0, "私", "わたし", None);
        assert_eq!(node.key(), "私/わたし");
        assert_eq!(Node::create_bos().key(), "__BOS__/__BOS__");
        assert_eq!(Node::create_eos(3).key(), "__EOS__");
    }

    #[test]
    fn test_end_pos() {
        let node = Node::new(2, "名前", "なまえ", None);
        assert_eq!(node.end_pos(), 5);
    }

    #[test]
    fn test_surface_raw() {
        let evaluator = lisp::Evaluator::default();
        let node = Node::new(0, "私", "わたし", None);
        assert_eq!(node.surface(&evaluator), "私");
    }

    #[test]
    fn test_surface_lisp() {
        let evaluator = lisp::Evaluator::default();
        let node = Node::new(0, r#"(. "に" "ち")"#, "にち", None);
        assert_eq!(node.surface(&evaluator), "にち");
    }
}
