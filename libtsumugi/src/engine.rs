use std::collections::HashMap;
use std::ops::Range;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::Result;
use log::{error, info};
use regex::Regex;

use crate::config::{DictUsage, EngineConfig};
use crate::dict::binary_dict::BinaryDict;
use crate::dict::skk::parse_skk_jisyo;
use crate::graph::graph_resolver::GraphResolver;
use crate::graph::node::Node;
use crate::lisp;
use crate::lm::language_model::LanguageModel;
use crate::lm::system_bigram_lm::SystemBigramLM;
use crate::lm::system_unigram_lm::SystemUnigramLM;
use crate::lm::user_language_model::UserLanguageModel;
use crate::romkan::RomkanConverter;

/// バイグラムのビタビベースかな漢字変換エンジン。
///
/// ローマ字を受け取り、文節ごとの候補リストを返す。確定結果は
/// `learn()` でユーザー言語モデルに反映する。
pub struct BigramViterbiEngine {
    romkan: RomkanConverter,
    resolver: GraphResolver,
    pub user_language_model: Arc<UserLanguageModel>,
    pub lisp_evaluator: lisp::Evaluator,
    // 子音だが、n は nn で「ん」になるので対象外。
    trailing_consonant_pattern: Regex,
}

impl BigramViterbiEngine {
    pub fn new(
        romkan: RomkanConverter,
        resolver: GraphResolver,
        user_language_model: Arc<UserLanguageModel>,
    ) -> Result<BigramViterbiEngine> {
        Ok(BigramViterbiEngine {
            romkan,
            resolver,
            user_language_model,
            lisp_evaluator: lisp::Evaluator::default(),
            trailing_consonant_pattern: Regex::new(r"^(.*?)([qwrtypsdfghjklzxcvbm]+)$")?,
        })
    }

    /// 連文節変換する。
    ///
    /// 空文字列は空の結果になる。ラティスが壊れていた場合は診断ログを
    /// 出した上で空の結果を返す。例外を制御フローに使わない。
    pub fn convert(
        &self,
        src: &str,
        forced_clauses: Option<&[Range<usize>]>,
    ) -> Result<Vec<Vec<Node>>> {
        if src.is_empty() {
            return Ok(vec![]);
        }

        // 最初の文字が大文字で、文節の強制指定がない場合、
        // アルファベットのまま通す。
        if src.chars().next().map(|c| c.is_ascii_uppercase()) == Some(true)
            && forced_clauses.is_none()
        {
            return Ok(vec![vec![Node::new(0, src, src, None)]]);
        }

        let hiragana = self.romkan.to_hiragana(src);

        // 末尾の子音は変換対象外とし、あとで独立した文節として足し戻す。
        let stripped = self
            .trailing_consonant_pattern
            .captures(&hiragana)
            .map(|m| (m[1].to_string(), m[2].to_string()));
        let (hiragana, consonant) = match stripped {
            Some((stem, consonant)) => (stem, Some(consonant)),
            None => (hiragana, None),
        };

        let mut clauses = if hiragana.is_empty() {
            vec![]
        } else {
            let ht: HashMap<String, Vec<String>> =
                self.resolver.lookup(&hiragana).into_iter().collect();
            let lattice = self.resolver.graph_construct(&hiragana, &ht, forced_clauses)?;
            match self.resolver.viterbi(&lattice) {
                Ok(clauses) => clauses,
                Err(err) => {
                    error!("Giving up the conversion of {:?}: {}", hiragana, err);
                    return Ok(vec![]);
                }
            }
        };

        if let Some(consonant) = consonant {
            clauses.push(vec![Node::new(
                hiragana.chars().count() as i32,
                &consonant,
                &consonant,
                None,
            )]);
        }

        Ok(clauses)
    }

    /// 確定された文節リストを学習する。
    pub fn learn(&self, nodes: &[Node]) {
        self.user_language_model.add_entry(nodes);
    }

    /// 表示用の表層形。LISP 式の辞書エントリーを展開する。
    pub fn surface(&self, node: &Node) -> String {
        node.surface(&self.lisp_evaluator)
    }
}

pub struct BigramViterbiEngineBuilder {
    config: EngineConfig,
    user_language_model: Option<Arc<UserLanguageModel>>,
}

impl BigramViterbiEngineBuilder {
    pub fn new(config: EngineConfig) -> BigramViterbiEngineBuilder {
        BigramViterbiEngineBuilder {
            config,
            user_language_model: None,
        }
    }

    /// 差し替え用。テストや、プロセス内で共有したい場合に使う。
    pub fn user_language_model(&mut self, model: Arc<UserLanguageModel>) -> &mut Self {
        self.user_language_model = Some(model);
        self
    }

    pub fn build(&self) -> Result<BigramViterbiEngine> {
        let model_dir = &self.config.model_dir;

        let system_unigram_lm = Rc::new(SystemUnigramLM::load(
            &Self::model_path(model_dir, "unigram.trie"),
        )?);
        let system_bigram_lm = Rc::new(SystemBigramLM::load(
            &Self::model_path(model_dir, "bigram.trie"),
        )?);

        let mut normal_dicts = vec![Rc::new(BinaryDict::load(
            &Self::model_path(model_dir, "system_dict.trie"),
        )?)];
        let mut single_term_dicts = vec![Rc::new(BinaryDict::load(
            &Self::model_path(model_dir, "single_term.trie"),
        )?)];

        for dict_config in &self.config.dicts {
            let dict = if dict_config.path.ends_with(".trie") {
                BinaryDict::load(&dict_config.path)?
            } else {
                let entries =
                    parse_skk_jisyo(PathBuf::from(&dict_config.path).as_path(), dict_config.encoding)?;
                BinaryDict::build(&entries)?
            };
            match dict_config.usage {
                DictUsage::Normal => normal_dicts.push(Rc::new(dict)),
                DictUsage::SingleTerm => single_term_dicts.push(Rc::new(dict)),
            }
        }

        let user_language_model = match &self.user_language_model {
            Some(model) => model.clone(),
            None => {
                let user_data_dir = match &self.config.user_data_dir {
                    Some(dir) => PathBuf::from(dir),
                    None => xdg::BaseDirectories::with_prefix("tsumugi")?
                        .create_data_directory("user_language_model")?,
                };
                info!("User language model directory: {:?}", user_data_dir);
                Arc::new(UserLanguageModel::load(&user_data_dir))
            }
        };

        let language_model = Rc::new(LanguageModel::new(
            system_unigram_lm,
            system_bigram_lm,
            user_language_model.clone(),
        ));

        let resolver = GraphResolver::new(
            normal_dicts,
            single_term_dicts,
            language_model,
            user_language_model.clone(),
        );

        let romaji: Vec<(String, String)> = self
            .config
            .romaji
            .iter()
            .map(|(roma, kana)| (roma.clone(), kana.clone()))
            .collect();
        let romkan = RomkanConverter::new(&romaji)?;

        BigramViterbiEngine::new(romkan, resolver, user_language_model)
    }

    fn model_path(model_dir: &str, name: &str) -> String {
        format!("{}/{}", model_dir, name)
    }
}
