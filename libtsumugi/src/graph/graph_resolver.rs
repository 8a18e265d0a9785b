use std::cmp::Ordering;
use std::collections::btree_map::BTreeMap;
use std::collections::HashMap;
use std::ops::Range;
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use kelp::{hira2kata, ConvOption};
use log::{error, trace};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::dict::binary_dict::BinaryDict;
use crate::graph::lattice_graph::LatticeGraph;
use crate::graph::node::Node;
use crate::lm::language_model::LanguageModel;
use crate::lm::user_language_model::UserLanguageModel;
use crate::romkan;

/// 読みからラティスを構築し、ビタビで最良パスと文節ごとの候補を求める。
pub struct GraphResolver {
    normal_dicts: Vec<Rc<BinaryDict>>,
    single_term_dicts: Vec<Rc<BinaryDict>>,
    language_model: Rc<LanguageModel>,
    user_language_model: Arc<UserLanguageModel>,
}

impl GraphResolver {
    pub fn new(
        normal_dicts: Vec<Rc<BinaryDict>>,
        single_term_dicts: Vec<Rc<BinaryDict>>,
        language_model: Rc<LanguageModel>,
        user_language_model: Arc<UserLanguageModel>,
    ) -> GraphResolver {
        GraphResolver {
            normal_dicts,
            single_term_dicts,
            language_model,
            user_language_model,
        }
    }

    /// 読みの各開始位置について、そこから始まる候補語と表層リストを列挙する。
    /// どの位置にも最低 1 ノード立つように、辞書にかすらない位置では
    /// 1 文字のフォールバックを返す。
    pub fn lookup(&self, yomi: &str) -> Vec<(String, Vec<String>)> {
        let chars: Vec<char> = yomi.chars().collect();
        let mut result: Vec<(String, Vec<String>)> = Vec::new();

        for i in 0..chars.len() {
            let rest: String = chars[i..].iter().collect();

            // 通常辞書の接頭辞の和集合。順序は保存する。
            let mut words: Vec<String> = Vec::new();
            let mut seen: FxHashSet<String> = FxHashSet::default();
            for dict in &self.normal_dicts {
                for prefix in dict.prefixes(&rest) {
                    if seen.insert(prefix.clone()) {
                        words.push(prefix);
                    }
                }
            }

            if !words.is_empty() {
                let rest_in_words = words.iter().any(|word| *word == rest);
                for word in &words {
                    let mut surfaces: Vec<String> = Vec::new();
                    for dict in &self.normal_dicts {
                        for surface in dict.find_words(word) {
                            if !surfaces.contains(&surface) {
                                surfaces.push(surface);
                            }
                        }
                    }
                    if !surfaces.contains(word) {
                        surfaces.push(word.clone());
                    }
                    let katakana = hira2kata(word, ConvOption::default());
                    if !surfaces.contains(&katakana) {
                        surfaces.push(katakana);
                    }
                    // 残り全体が辞書語のときだけ、絵文字などの単文節辞書も引く。
                    if *word == rest {
                        self.push_single_term_surfaces(word, &mut surfaces);
                    }
                    result.push((word.clone(), surfaces));
                }

                // システム辞書に入ってないがユーザー言語モデルには
                // 入っているという場合は候補にいれる。
                if !rest_in_words && self.user_language_model.has_unigram_cost_by_yomi(&rest) {
                    let mut surfaces = vec![rest.clone()];
                    let katakana = hira2kata(&rest, ConvOption::default());
                    if !surfaces.contains(&katakana) {
                        surfaces.push(katakana);
                    }
                    self.push_single_term_surfaces(&rest, &mut surfaces);
                    result.push((rest.clone(), surfaces));
                }
            } else {
                // どの接頭辞にもかすらない。グラフを繋げるために 1 文字だけ出す。
                let first: String = chars[i].to_string();
                let mut surfaces = vec![first.clone()];
                let katakana = hira2kata(&first, ConvOption::default());
                if !surfaces.contains(&katakana) {
                    surfaces.push(katakana);
                }
                self.push_single_term_surfaces(&first, &mut surfaces);
                result.push((first, surfaces));
            }
        }

        result
    }

    fn push_single_term_surfaces(&self, yomi: &str, surfaces: &mut Vec<String>) {
        for dict in &self.single_term_dicts {
            for surface in dict.find_words(yomi) {
                if !surfaces.contains(&surface) {
                    surfaces.push(surface);
                }
            }
        }
    }

    /// n 文字目でおわる単語リストを作成する。
    /// `forced_clauses` が指定されたらその分節だけにノードを立てる。
    pub fn graph_construct(
        &self,
        yomi: &str,
        ht: &HashMap<String, Vec<String>>,
        forced_clauses: Option<&[Range<usize>]>,
    ) -> Result<LatticeGraph> {
        let chars: Vec<char> = yomi.chars().collect();
        let yomi_len = chars.len() as i32;

        let mut graph: BTreeMap<i32, Vec<Node>> = BTreeMap::new();
        graph.insert(0, vec![Node::create_bos()]);
        graph.insert(yomi_len + 1, vec![Node::create_eos(yomi_len)]);

        if let Some(clauses) = forced_clauses {
            for clause in clauses {
                ensure!(
                    clause.start < clause.end,
                    "Forced clause must not be empty: {:?} on {:?}",
                    clause,
                    yomi
                );
                ensure!(
                    clause.end <= chars.len(),
                    "Forced clause is out of range: {:?} on {:?}",
                    clause,
                    yomi
                );
                let sub: String = chars[clause.start..clause.end].iter().collect();
                let start = clause.start as i32;
                let end = clause.end as i32;
                if let Some(surfaces) = ht.get(&sub) {
                    self.add_word_nodes(&mut graph, start, end, &sub, surfaces);
                } else {
                    // 辞書にない範囲を強制された。ひらがな・カタカナ・
                    // ローマ字・全角ローマ字の 4 候補を立てる。
                    self.add_fallback_nodes(&mut graph, start, end, &sub);
                }
            }
        } else {
            for i in 0..chars.len() {
                // ここから始まるノードは、ここで終わるノードがないと到達できない。
                // 到達できないノードはラティスに入れない。
                if i > 0 && !graph.contains_key(&(i as i32)) {
                    continue;
                }
                for j in (i + 1)..=chars.len() {
                    let sub: String = chars[i..j].iter().collect();
                    if let Some(surfaces) = ht.get(&sub) {
                        self.add_word_nodes(&mut graph, i as i32, j as i32, &sub, surfaces);
                    } else if self.user_language_model.has_unigram_cost_by_yomi(&sub) {
                        // ユーザーが知っている読みなら、辞書になくても候補を出す。
                        self.add_fallback_nodes(&mut graph, i as i32, j as i32, &sub);
                    }
                }
            }
        }

        Ok(LatticeGraph::new(yomi, graph))
    }

    fn make_word_node(&self, start_pos: i32, word: &str, yomi: &str) -> Node {
        let mut key = String::with_capacity(word.len() + 1 + yomi.len());
        key.push_str(word);
        key.push('/');
        key.push_str(yomi);
        let word_id_and_score = self.language_model.find_unigram(&key);
        trace!("WordIDScore: {} {:?}", key, word_id_and_score);
        Node::new(start_pos, word, yomi, word_id_and_score)
    }

    fn add_word_nodes(
        &self,
        graph: &mut BTreeMap<i32, Vec<Node>>,
        start_pos: i32,
        end_pos: i32,
        yomi: &str,
        surfaces: &[String],
    ) {
        if surfaces.is_empty() {
            return;
        }
        let bucket = graph.entry(end_pos).or_default();
        for surface in surfaces {
            let node = self.make_word_node(start_pos, surface, yomi);
            if !bucket.contains(&node) {
                bucket.push(node);
            }
        }
    }

    fn add_fallback_nodes(
        &self,
        graph: &mut BTreeMap<i32, Vec<Node>>,
        start_pos: i32,
        end_pos: i32,
        yomi: &str,
    ) {
        let romaji = romkan::kana2romaji(yomi);
        let zenkaku_romaji = to_zenkaku(&romaji);
        let bucket = graph.entry(end_pos).or_default();
        for surface in [
            yomi.to_string(),
            hira2kata(yomi, ConvOption::default()),
            romaji,
            zenkaku_romaji,
        ] {
            let node = self.make_word_node(start_pos, &surface, yomi);
            if !bucket.contains(&node) {
                bucket.push(node);
            }
        }
    }

    /// ビタビアルゴリズムにもとづき、最良の経路を求めて、文節ごとの
    /// 候補リストを返す。
    pub fn viterbi(&self, lattice: &LatticeGraph) -> Result<Vec<Vec<Node>>> {
        let (costmap, prevmap) = self.fill_cost(lattice)?;
        self.find_nbest(lattice, &costmap, &prevmap)
    }

    /// 前向きパス。各ノードについて BOS からの最良累積コストと
    /// 最良の直前ノードを埋める。コストは log10 確率なので最大化する。
    fn fill_cost<'a>(
        &self,
        lattice: &'a LatticeGraph,
    ) -> Result<(FxHashMap<&'a Node, f32>, FxHashMap<&'a Node, &'a Node>)> {
        let mut costmap: FxHashMap<&Node, f32> = FxHashMap::default();
        let mut prevmap: FxHashMap<&Node, &Node> = FxHashMap::default();

        let bos = lattice.get_bos().context("BOS node not found")?;
        costmap.insert(bos, 0.0);

        for i in 1..=(lattice.yomi_len + 1) {
            let Some(nodes) = lattice.node_list(i) else {
                continue;
            };
            for node in nodes {
                let node_cost = self.language_model.calc_node_cost(node);
                trace!("fill_cost: {} cost={}", node, node_cost);

                let prev_nodes = lattice.get_prev_nodes(node).with_context(|| {
                    format!(
                        "Cannot get prev nodes for '{}' start={}",
                        node.word, node.start_pos
                    )
                })?;

                if prev_nodes.len() == 1 && prev_nodes[0].is_bos() {
                    prevmap.insert(node, &prev_nodes[0]);
                    costmap.insert(node, node_cost);
                    continue;
                }

                let mut cost = f32::MIN;
                let mut best_prev: Option<&Node> = None;
                for prev in prev_nodes {
                    let prev_cost = costmap.get(prev).copied().with_context(|| {
                        format!("Cost is not filled for the previous node: {}", prev)
                    })?;
                    let edge_cost = lattice.edge_cost(&self.language_model, prev, node);
                    let tmp_cost = prev_cost + edge_cost + node_cost;
                    // コストが最大な経路を選ぶ。同点なら先に見たほうが勝つ。
                    if cost < tmp_cost {
                        cost = tmp_cost;
                        best_prev = Some(prev);
                    }
                }
                let best_prev = best_prev.with_context(|| {
                    format!(
                        "No valid previous node found for '{}' (start_pos={}, yomi={})",
                        node.word, node.start_pos, lattice.yomi
                    )
                })?;
                prevmap.insert(node, best_prev);
                costmap.insert(node, cost);
            }
        }

        Ok((costmap, prevmap))
    }

    /// 後ろ向きパス。EOS から BOS へ最良経路をたどりながら、
    /// 各文節について同じ読みの候補を降順で集める。
    fn find_nbest<'a>(
        &self,
        lattice: &'a LatticeGraph,
        costmap: &FxHashMap<&'a Node, f32>,
        prevmap: &FxHashMap<&'a Node, &'a Node>,
    ) -> Result<Vec<Vec<Node>>> {
        let eos = lattice.get_eos().context("EOS node not found")?;

        let mut node: &Node = eos;
        let mut last_node: Option<&Node> = None;
        let mut result: Vec<Vec<Node>> = Vec::new();

        while !node.is_bos() {
            let prev = *prevmap
                .get(node)
                .with_context(|| format!("Cannot get the previous node: {}", node))?;
            if prev == node {
                // ラティスが壊れている。診断用にグラフを吐いて打ち切る。
                error!("Corrupted lattice:\n{}", lattice.dump_position_dot());
                bail!("node == node.prev: {}", node);
            }

            if !node.is_eos() {
                // 同じ読みで同じ位置に終わる候補をすべて集めて 1 文節にする。
                let alternatives: Vec<&Node> = lattice
                    .node_list(node.end_pos())
                    .map(|nodes| {
                        nodes
                            .iter()
                            .filter(|alt| alt.yomi == node.yomi && alt.start_pos == node.start_pos)
                            .collect()
                    })
                    .unwrap_or_default();
                let mut scored: Vec<(f32, &Node)> = alternatives
                    .into_iter()
                    .map(|alt| {
                        let cost = costmap.get(alt).copied().unwrap_or_else(|| {
                            error!("Cost not found for node {}", alt);
                            f32::MIN
                        });
                        let edge_cost = match last_node {
                            Some(last) => lattice.edge_cost(&self.language_model, alt, last),
                            None => 0.0,
                        };
                        (cost + edge_cost, alt)
                    })
                    .collect();
                scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
                result.push(scored.into_iter().map(|(_, alt)| alt.clone()).collect());

                last_node = Some(node);
            }

            node = prev;
        }

        result.reverse();
        Ok(result)
    }
}

/// ASCII を全角に寄せる。jaconv の h2z(ascii=True, digit=True) 相当。
fn to_zenkaku(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '!'..='~' => char::from_u32(c as u32 + 0xfee0).unwrap_or(c),
            ' ' => '　',
            _ => c,
        })
        .collect()
}
