use std::cell::RefCell;
use std::collections::btree_map::BTreeMap;
use std::fmt::{Debug, Formatter};

use rustc_hash::FxHashMap;

use crate::graph::node::Node;
use crate::lm::language_model::LanguageModel;

// 考えられる単語の列全てを含むようなグラフ構造。
// インデクスは単語の終了位置（コードポイント単位）。
// 0 番には BOS、N+1 番には EOS だけが入る。
pub struct LatticeGraph {
    pub(crate) yomi: String,
    /// 読みのコードポイント数。
    pub(crate) yomi_len: i32,
    pub(crate) graph: BTreeMap<i32, Vec<Node>>,
    // バイグラムコストのメモ。変換 1 回分だけ生きて、グラフと一緒に捨てる。
    edge_cost_cache: RefCell<FxHashMap<(String, String), f32>>,
}

impl Debug for LatticeGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LatticeGraph(yomi={}, graph={:?})",
            self.yomi, self.graph
        )
    }
}

impl LatticeGraph {
    pub(crate) fn new(yomi: &str, graph: BTreeMap<i32, Vec<Node>>) -> LatticeGraph {
        LatticeGraph {
            yomi: yomi.to_string(),
            yomi_len: yomi.chars().count() as i32,
            graph,
            edge_cost_cache: RefCell::new(FxHashMap::default()),
        }
    }

    /// i 文字目で終わるノードを探す
    pub fn node_list(&self, end_pos: i32) -> Option<&Vec<Node>> {
        self.graph.get(&end_pos)
    }

    //  0   1  2 3
    // BOS  わ た し
    //      [   ][ ]
    //      [      ]
    pub(crate) fn get_prev_nodes(&self, node: &Node) -> Option<&Vec<Node>> {
        self.graph.get(&node.start_pos)
    }

    pub(crate) fn get_bos(&self) -> Option<&Node> {
        self.graph.get(&0).and_then(|nodes| nodes.first())
    }

    pub(crate) fn get_eos(&self) -> Option<&Node> {
        self.graph
            .get(&(self.yomi_len + 1))
            .and_then(|nodes| nodes.first())
    }

    /// バイグラムコスト。変換 1 回の中で同じ遷移を何度も引くのでメモ化する。
    pub(crate) fn edge_cost(&self, lm: &LanguageModel, prev: &Node, next: &Node) -> f32 {
        let cache_key = (prev.key().to_string(), next.key().to_string());
        if let Some(cost) = self.edge_cost_cache.borrow().get(&cache_key) {
            return *cost;
        }
        let cost = lm.calc_bigram_cost(prev, next);
        self.edge_cost_cache.borrow_mut().insert(cache_key, cost);
        cost
    }

    // for debugging purpose
    /// graphviz の dot 形式でノードの接続を出力する。
    pub fn dump_position_dot(&self) -> String {
        let mut buf = String::new();
        buf += "digraph Lattice {\n";
        for (end_pos, nodes) in self.graph.iter() {
            for node in nodes {
                buf += &*format!(
                    r#"    {} -> "{}/{}"{}"#,
                    node.start_pos, node.word, node.yomi, "\n"
                );
                buf += &*format!(r#"    "{}/{}" -> {}{}"#, node.word, node.yomi, end_pos, "\n");
            }
        }
        buf += "}\n";
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> LatticeGraph {
        // わたし: [0..3]=わたし, [0..2]=わた, [2..3]=し
        let mut graph = BTreeMap::new();
        graph.insert(0, vec![Node::create_bos()]);
        graph.insert(2, vec![Node::new(0, "綿", "わた", None)]);
        graph.insert(
            3,
            vec![
                Node::new(0, "私", "わたし", None),
                Node::new(2, "氏", "し", None),
            ],
        );
        graph.insert(4, vec![Node::create_eos(3)]);
        LatticeGraph::new("わたし", graph)
    }

    #[test]
    fn test_node_list() {
        let graph = sample_graph();
        assert!(graph.node_list(0).is_some()); // BOS
        assert_eq!(graph.node_list(2).unwrap().len(), 1);
        assert_eq!(graph.node_list(3).unwrap().len(), 2);
        assert!(graph.node_list(4).is_some()); // EOS
        assert!(graph.node_list(100).is_none());
    }

    #[test]
    fn test_get_prev_nodes() {
        let graph = sample_graph();
        let shi = &graph.node_list(3).unwrap()[1];
        let prev_nodes = graph.get_prev_nodes(shi).unwrap();
        assert_eq!(prev_nodes.len(), 1);
        assert_eq!(prev_nodes[0].word, "綿");

        let watashi = &graph.node_list(3).unwrap()[0];
        let prev_nodes = graph.get_prev_nodes(watashi).unwrap();
        assert!(prev_nodes[0].is_bos());
    }

    #[test]
    fn test_sentinels() {
        let graph = sample_graph();
        assert!(graph.get_bos().unwrap().is_bos());
        assert!(graph.get_eos().unwrap().is_eos());
        assert_eq!(graph.get_eos().unwrap().start_pos, 3);
    }

    #[test]
    fn test_dump_position_dot() {
        let graph = sample_graph();
        let dot = graph.dump_position_dot();
        assert!(dot.contains("私/わたし"));
    }
}
