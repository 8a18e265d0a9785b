use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use crate::config::DictEncoding;
use crate::romkan::RomkanConverter;

const BOIN: [char; 5] = ['a', 'i', 'u', 'e', 'o'];

/// SKK 形式の辞書をパースして (読み, 表層リスト) の列にする。
/// 送り仮名ありのエントリーは、送り仮名を展開して送りなし形に変換する。
pub fn parse_skk_jisyo(path: &Path, encoding: DictEncoding) -> Result<Vec<(String, Vec<String>)>> {
    let bytes =
        fs::read(path).with_context(|| format!("Cannot read SKK dictionary: {:?}", path))?;
    let content = match encoding {
        DictEncoding::Utf8 => String::from_utf8_lossy(&bytes).to_string(),
        DictEncoding::EucJp => {
            let (decoded, _, _) = encoding_rs::EUC_JP.decode(&bytes);
            decoded.to_string()
        }
    };

    let romkan = RomkanConverter::new(&[])?;

    let mut ari: Vec<(String, Vec<String>)> = Vec::new();
    let mut nasi: Vec<(String, Vec<String>)> = Vec::new();
    // マーカー行が出てくるまでは送りありセクションとして扱う。
    let mut in_okuri_ari = true;

    for line in content.lines() {
        if line == ";; okuri-ari entries." {
            in_okuri_ari = true;
            continue;
        }
        if line == ";; okuri-nasi entries." {
            in_okuri_ari = false;
            continue;
        }
        if line.starts_with(";;") {
            continue;
        }

        let Some((yomi, surfaces)) = line.trim().split_once(' ') else {
            continue;
        };
        let surfaces: Vec<String> = surfaces
            .trim_start_matches('/')
            .trim_end_matches('/')
            .split('/')
            .map(|surface| {
                // `;` 以降はアノテーション。
                match surface.split_once(';') {
                    Some((s, _)) => s.to_string(),
                    None => surface.to_string(),
                }
            })
            .filter(|surface| !surface.is_empty())
            .collect();
        if surfaces.is_empty() {
            continue;
        }

        if in_okuri_ari {
            ari.push((yomi.to_string(), surfaces));
        } else {
            nasi.push((yomi.to_string(), surfaces));
        }
    }

    let mut result = nasi;
    for (yomi, surfaces) in &ari {
        for (expanded_yomi, expanded_surfaces) in expand_okuri(&romkan, yomi, surfaces) {
            result.push((expanded_yomi, expanded_surfaces));
        }
    }

    info!("Parsed SKK dictionary {:?}: {} entries", path, result.len());
    Ok(result)
}

/// 送りありエントリーの末尾アルファベットを送り仮名に展開する。
/// `あつk /厚/` → `あつく /厚く/`, `あつけ /厚け/`, ...
fn expand_okuri(
    romkan: &RomkanConverter,
    yomi: &str,
    surfaces: &[String],
) -> Vec<(String, Vec<String>)> {
    let Some(last) = yomi.chars().last() else {
        return Vec::new();
    };
    if !last.is_ascii_alphabetic() {
        return vec![(yomi.to_string(), surfaces.to_vec())];
    }

    let stem: String = yomi.chars().take(yomi.chars().count() - 1).collect();
    let mut result = Vec::new();
    if BOIN.contains(&last) {
        let okuri = romkan.to_hiragana(&last.to_string());
        result.push((
            format!("{}{}", stem, okuri),
            surfaces.iter().map(|s| format!("{}{}", s, okuri)).collect(),
        ));
    } else {
        for boin in BOIN {
            let okuri = romkan.to_hiragana(&format!("{}{}", last, boin));
            if okuri.chars().any(|c| c.is_ascii_lowercase()) {
                // wu のように変換できないものは無視する。
                continue;
            }
            result.push((
                format!("{}{}", stem, okuri),
                surfaces.iter().map(|s| format!("{}{}", s, okuri)).collect(),
            ));
        }
    }
    result
}
