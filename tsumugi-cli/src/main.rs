use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use libtsumugi::config::{DictEncoding, EngineConfig};
use libtsumugi::dict::binary_dict::BinaryDict;
use libtsumugi::dict::skk::parse_skk_jisyo;
use libtsumugi::engine::BigramViterbiEngineBuilder;

#[derive(Debug, Clone, ValueEnum)]
enum Encoding {
    Utf8,
    EucJp,
}

impl From<Encoding> for DictEncoding {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Utf8 => DictEncoding::Utf8,
            Encoding::EucJp => DictEncoding::EucJp,
        }
    }
}

#[derive(Debug, Parser)]
#[clap(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    arg_required_else_help = true,
)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[clap(arg_required_else_help = true)]
    Convert(ConvertArgs),
    #[clap(arg_required_else_help = true)]
    MakeDict(MakeDictArgs),
    #[clap(arg_required_else_help = true)]
    DumpDict(DumpDictArgs),
}

/// ローマ字をかな漢字変換する（CLI テスト用）
#[derive(Debug, clap::Args)]
struct ConvertArgs {
    /// 設定ファイル（YAML）
    #[arg(short, long)]
    config: PathBuf,
    /// 各文節の候補数
    #[arg(short = 'n', long, default_value_t = 1)]
    candidates: usize,
    /// 変換したいローマ字。省略時は標準入力を 1 行ずつ変換する。
    text: Vec<String>,
}

/// SKK 形式のテキスト辞書からバイナリ辞書を作成する
#[derive(Debug, clap::Args)]
struct MakeDictArgs {
    #[arg(short, long, value_enum, default_value_t = Encoding::Utf8)]
    encoding: Encoding,
    src: PathBuf,
    dst: String,
}

/// バイナリ辞書の中身をダンプする
#[derive(Debug, clap::Args)]
struct DumpDictArgs {
    dict: String,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    match args.command {
        Commands::Convert(opt) => convert(&opt.config, opt.candidates, &opt.text),
        Commands::MakeDict(opt) => make_dict(&opt.src, &opt.dst, opt.encoding.into()),
        Commands::DumpDict(opt) => dump_dict(&opt.dict),
    }
}

fn convert(config_path: &Path, candidates: usize, text: &[String]) -> Result<()> {
    let config = EngineConfig::load(config_path)?;
    let engine = BigramViterbiEngineBuilder::new(config).build()?;

    let run = |src: &str| -> Result<()> {
        let clauses = engine.convert(src, None)?;
        let joined = clauses
            .iter()
            .filter_map(|clause| clause.first())
            .map(|node| engine.surface(node))
            .collect::<Vec<_>>()
            .join("");
        println!("{}", joined);
        if candidates > 1 {
            for clause in &clauses {
                let alternatives = clause
                    .iter()
                    .take(candidates)
                    .map(|node| engine.surface(node))
                    .collect::<Vec<_>>()
                    .join("/");
                println!("  {}: {}", clause[0].yomi, alternatives);
            }
        }
        Ok(())
    };

    if text.is_empty() {
        for line in std::io::stdin().lock().lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            run(line)?;
        }
    } else {
        for src in text {
            run(src)?;
        }
    }
    Ok(())
}

fn make_dict(src: &Path, dst: &str, encoding: DictEncoding) -> Result<()> {
    let entries = parse_skk_jisyo(src, encoding)?;
    let dict = BinaryDict::build_and_save(&entries, dst)?;
    println!("Built {} ({} entries)", dst, dict.num_keys());
    Ok(())
}

fn dump_dict(path: &str) -> Result<()> {
    let dict = BinaryDict::load(path)?;
    for yomi in dict.yomis() {
        let surfaces = dict.find_words(&yomi);
        println!("{} /{}/", yomi, surfaces.join("/"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }
}
