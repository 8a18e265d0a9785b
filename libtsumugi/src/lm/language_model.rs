use std::rc::Rc;
use std::sync::Arc;

use log::trace;

use crate::graph::node::Node;
use crate::lm::system_bigram_lm::SystemBigramLM;
use crate::lm::system_unigram_lm::SystemUnigramLM;
use crate::lm::user_language_model::UserLanguageModel;

// log10(1e-20)。言語モデルにない単語・遷移のコスト。
pub const UNIGRAM_DEFAULT_COST: f32 = -20.0;
pub const BIGRAM_DEFAULT_COST: f32 = -20.0;

/// ユーザー言語モデルとシステム言語モデルをまとめるファサード。
/// ユーザーのスコアがあれば優先し、なければシステム、
/// どちらにもなければデフォルトコスト。
pub struct LanguageModel {
    system_unigram_lm: Rc<SystemUnigramLM>,
    system_bigram_lm: Rc<SystemBigramLM>,
    user_language_model: Arc<UserLanguageModel>,
}

impl LanguageModel {
    pub fn new(
        system_unigram_lm: Rc<SystemUnigramLM>,
        system_bigram_lm: Rc<SystemBigramLM>,
        user_language_model: Arc<UserLanguageModel>,
    ) -> LanguageModel {
        LanguageModel {
            system_unigram_lm,
            system_bigram_lm,
            user_language_model,
        }
    }

    pub fn find_unigram(&self, key: &str) -> Option<(i32, f32)> {
        self.system_unigram_lm.find_unigram(key)
    }

    pub fn calc_node_cost(&self, node: &Node) -> f32 {
        if node.is_bos() || node.is_eos() {
            return 0.0;
        }

        if let Some(user_cost) = self.user_language_model.get_unigram_cost(node.key()) {
            trace!("Use user's node score: {} -> {}", node.key(), user_cost);
            return user_cost;
        }

        match node.word_id_and_score {
            Some((_, score)) => score,
            None => UNIGRAM_DEFAULT_COST,
        }
    }

    pub fn calc_bigram_cost(&self, prev: &Node, next: &Node) -> f32 {
        if let Some(user_cost) = self
            .user_language_model
            .get_bigram_cost(prev.key(), next.key())
        {
            trace!(
                "Use user's bigram score: {},{} -> {}",
                prev.key(),
                next.key(),
                user_cost
            );
            return user_cost;
        }

        let Some((prev_id, _)) = prev.word_id_and_score else {
            return BIGRAM_DEFAULT_COST;
        };
        let Some((next_id, _)) = next.word_id_and_score else {
            return BIGRAM_DEFAULT_COST;
        };
        match self.system_bigram_lm.find_bigram(prev_id, next_id) {
            Some(score) => score,
            None => BIGRAM_DEFAULT_COST,
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use crate::lm::system_bigram_lm::SystemBigramLMBuilder;
    use crate::lm::system_unigram_lm::SystemUnigramLMBuilder;

    use super::*;

    fn build_lm() -> anyhow::Result<(LanguageModel, TempDir)> {
        let mut unigram_builder = SystemUnigramLMBuilder::default();
        unigram_builder.add("私/わたし", -1.5);
        unigram_builder.add("彼/かれ", -2.0);
        let system_unigram_lm = Rc::new(unigram_builder.build()?);

        let watashi_id = system_unigram_lm.find_unigram("私/わたし").unwrap().0;
        let kare_id = system_unigram_lm.find_unigram("彼/かれ").unwrap().0;

        let mut bigram_builder = SystemBigramLMBuilder::default();
        bigram_builder.add(watashi_id, kare_id, -0.5)?;
        let system_bigram_lm = Rc::new(bigram_builder.build()?);

        let tmpdir = TempDir::new()?;
        let user_language_model = Arc::new(UserLanguageModel::load(tmpdir.path()));

        Ok((
            LanguageModel::new(system_unigram_lm, system_bigram_lm, user_language_model),
            tmpdir,
        ))
    }

    fn make_node(lm: &LanguageModel, word: &str, yomi: &str) -> Node {
        let key = format!("{}/{}", word, yomi);
        Node::new(0, word, yomi, lm.find_unigram(&key))
    }

    #[test]
    fn test_node_cost_system() -> anyhow::Result<()> {
        let (lm, _tmpdir) = build_lm()?;
        let node = make_node(&lm, "私", "わたし");
        assert_eq!(lm.calc_node_cost(&node), -1.5);
        Ok(())
    }

    #[test]
    fn test_node_cost_default() -> anyhow::Result<()> {
        let (lm, _tmpdir) = build_lm()?;
        let node = make_node(&lm, "未知語", "みちご");
        assert_eq!(lm.calc_node_cost(&node), UNIGRAM_DEFAULT_COST);
        Ok(())
    }

    #[test]
    fn test_node_cost_sentinels_are_free() -> anyhow::Result<()> {
        let (lm, _tmpdir) = build_lm()?;
        assert_eq!(lm.calc_node_cost(&Node::create_bos()), 0.0);
        assert_eq!(lm.calc_node_cost(&Node::create_eos(3)), 0.0);
        Ok(())
    }

    #[test]
    fn test_node_cost_user_priority() -> anyhow::Result<()> {
        let (lm, _tmpdir) = build_lm()?;
        let node = make_node(&lm, "私", "わたし");

        lm.user_language_model
            .add_entry(&[Node::new(0, "私", "わたし", None)]);
        // count=1, total=1 なので log10(1) = 0。システムの -1.5 より優先される。
        assert_eq!(lm.calc_node_cost(&node), 0.0);
        Ok(())
    }

    #[test]
    fn test_bigram_cost_system() -> anyhow::Result<()> {
        let (lm, _tmpdir) = build_lm()?;
        let watashi = make_node(&lm, "私", "わたし");
        let kare = make_node(&lm, "彼", "かれ");
        assert_eq!(lm.calc_bigram_cost(&watashi, &kare), -0.5);
        Ok(())
    }

    #[test]
    fn test_bigram_cost_default_for_unknown() -> anyhow::Result<()> {
        let (lm, _tmpdir) = build_lm()?;
        let watashi = make_node(&lm, "私", "わたし");
        let unknown = make_node(&lm, "未知語", "みちご");
        // ID が振られていないノードとの遷移はデフォルトコスト。
        assert_eq!(lm.calc_bigram_cost(&watashi, &unknown), BIGRAM_DEFAULT_COST);
        // ID があってもエントリーがなければデフォルトコスト。
        let kare = make_node(&lm, "彼", "かれ");
        assert_eq!(lm.calc_bigram_cost(&kare, &watashi), BIGRAM_DEFAULT_COST);
        Ok(())
    }

    #[test]
    fn test_bigram_cost_user_priority() -> anyhow::Result<()> {
        let (lm, _tmpdir) = build_lm()?;
        let watashi = make_node(&lm, "私", "わたし");
        let kare = make_node(&lm, "彼", "かれ");

        lm.user_language_model.add_entry(&[
            Node::new(0, "私", "わたし", None),
            Node::new(3, "彼", "かれ", None),
        ]);
        // count=1, prefix_total=1 なので log10(1) = 0。システムの -0.5 より優先される。
        assert_eq!(lm.calc_bigram_cost(&watashi, &kare), 0.0);
        Ok(())
    }
}
