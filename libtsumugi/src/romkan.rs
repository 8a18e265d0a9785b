use std::collections::HashMap;
use std::sync::OnceLock;

use anyhow::Result;
use regex::{Captures, Regex};

/// ローマ字→ひらがな変換テーブル。
/// KAKASI 由来のテーブルをベースに、訓令式とヘボン式の両方を受け付ける。
/// `du`/`di`/`fu`/`ti`/`wi`/`we`/`wo` のように複数の解釈がありうるものは、
/// ここに書いた値で固定している。
const DEFAULT_ROMKAN: &[(&str, &str)] = &[
    ("xa", "ぁ"),
    ("a", "あ"),
    ("xi", "ぃ"),
    ("i", "い"),
    ("xu", "ぅ"),
    ("u", "う"),
    ("vu", "う゛"),
    ("va", "う゛ぁ"),
    ("vi", "う゛ぃ"),
    ("ve", "う゛ぇ"),
    ("vo", "う゛ぉ"),
    ("xe", "ぇ"),
    ("e", "え"),
    ("xo", "ぉ"),
    ("o", "お"),
    ("ka", "か"),
    ("ga", "が"),
    ("ki", "き"),
    ("kya", "きゃ"),
    ("kyu", "きゅ"),
    ("kyo", "きょ"),
    ("gi", "ぎ"),
    ("gya", "ぎゃ"),
    ("gyu", "ぎゅ"),
    ("gyo", "ぎょ"),
    ("ku", "く"),
    ("gu", "ぐ"),
    ("ke", "け"),
    ("ge", "げ"),
    ("ko", "こ"),
    ("go", "ご"),
    ("sa", "さ"),
    ("za", "ざ"),
    ("shi", "し"),
    ("sha", "しゃ"),
    ("shu", "しゅ"),
    ("si", "し"),
    ("sya", "しゃ"),
    ("syu", "しゅ"),
    ("sho", "しょ"),
    ("syo", "しょ"),
    ("ji", "じ"),
    ("ja", "じゃ"),
    ("ju", "じゅ"),
    ("jo", "じょ"),
    ("zi", "じ"),
    ("zya", "じゃ"),
    ("zyu", "じゅ"),
    ("zyo", "じょ"),
    ("su", "す"),
    ("zu", "ず"),
    ("se", "せ"),
    ("ze", "ぜ"),
    ("so", "そ"),
    ("zo", "ぞ"),
    ("ta", "た"),
    ("da", "だ"),
    ("chi", "ち"),
    ("cha", "ちゃ"),
    ("chu", "ちゅ"),
    ("cho", "ちょ"),
    ("ti", "ち"),
    ("tya", "ちゃ"),
    ("tyu", "ちゅ"),
    ("tyo", "ちょ"),
    ("di", "ぢ"),
    ("dya", "ぢゃ"),
    ("dyu", "ぢゅ"),
    ("dyo", "ぢょ"),
    ("xtsu", "っ"),
    ("xtu", "っ"),
    ("vvu", "っう゛"),
    ("vva", "っう゛ぁ"),
    ("vvi", "っう゛ぃ"),
    ("vve", "っう゛ぇ"),
    ("vvo", "っう゛ぉ"),
    ("kka", "っか"),
    ("gga", "っが"),
    ("kki", "っき"),
    ("kkya", "っきゃ"),
    ("kkyu", "っきゅ"),
    ("kkyo", "っきょ"),
    ("ggi", "っぎ"),
    ("ggya", "っぎゃ"),
    ("ggyu", "っぎゅ"),
    ("ggyo", "っぎょ"),
    ("kku", "っく"),
    ("ggu", "っぐ"),
    ("kke", "っけ"),
    ("gge", "っげ"),
    ("kko", "っこ"),
    ("ggo", "っご"),
    ("ssa", "っさ"),
    ("zza", "っざ"),
    ("sshi", "っし"),
    ("ssha", "っしゃ"),
    ("sshu", "っしゅ"),
    ("ssho", "っしょ"),
    ("ssi", "っし"),
    ("ssya", "っしゃ"),
    ("ssyu", "っしゅ"),
    ("ssyo", "っしょ"),
    ("jji", "っじ"),
    ("jja", "っじゃ"),
    ("jju", "っじゅ"),
    ("jjo", "っじょ"),
    ("zzi", "っじ"),
    ("zzya", "っじゃ"),
    ("zzyu", "っじゅ"),
    ("zzyo", "っじょ"),
    ("ssu", "っす"),
    ("zzu", "っず"),
    ("sse", "っせ"),
    ("zze", "っぜ"),
    ("sso", "っそ"),
    ("zzo", "っぞ"),
    ("tta", "った"),
    ("dda", "っだ"),
    ("cchi", "っち"),
    ("tti", "っち"),
    ("ccha", "っちゃ"),
    ("cchu", "っちゅ"),
    ("ccho", "っちょ"),
    ("ttya", "っちゃ"),
    ("ttyu", "っちゅ"),
    ("ttyo", "っちょ"),
    ("ddi", "っぢ"),
    ("ddya", "っぢゃ"),
    ("ddyu", "っぢゅ"),
    ("ddyo", "っぢょ"),
    ("ttsu", "っつ"),
    ("ttu", "っつ"),
    ("ddu", "っづ"),
    ("tte", "って"),
    ("dde", "っで"),
    ("tto", "っと"),
    ("ddo", "っど"),
    ("hha", "っは"),
    ("bba", "っば"),
    ("ppa", "っぱ"),
    ("hhi", "っひ"),
    ("hhya", "っひゃ"),
    ("hhyu", "っひゅ"),
    ("hhyo", "っひょ"),
    ("bbi", "っび"),
    ("bbya", "っびゃ"),
    ("bbyu", "っびゅ"),
    ("bbyo", "っびょ"),
    ("ppi", "っぴ"),
    ("ppya", "っぴゃ"),
    ("ppyu", "っぴゅ"),
    ("ppyo", "っぴょ"),
    ("ffu", "っふ"),
    ("hhu", "っふ"),
    ("ffa", "っふぁ"),
    ("ffi", "っふぃ"),
    ("ffe", "っふぇ"),
    ("ffo", "っふぉ"),
    ("bbu", "っぶ"),
    ("ppu", "っぷ"),
    ("hhe", "っへ"),
    ("bbe", "っべ"),
    ("ppe", "っぺ"),
    ("hho", "っほ"),
    ("bbo", "っぼ"),
    ("ppo", "っぽ"),
    ("yya", "っや"),
    ("yyu", "っゆ"),
    ("yyo", "っよ"),
    ("rra", "っら"),
    ("rri", "っり"),
    ("rrya", "っりゃ"),
    ("rryu", "っりゅ"),
    ("rryo", "っりょ"),
    ("rru", "っる"),
    ("rre", "っれ"),
    ("rro", "っろ"),
    ("tu", "つ"),
    ("tsu", "つ"),
    ("du", "づ"),
    ("te", "て"),
    ("de", "で"),
    ("to", "と"),
    ("do", "ど"),
    ("na", "な"),
    ("ni", "に"),
    ("nya", "にゃ"),
    ("nyu", "にゅ"),
    ("nyo", "にょ"),
    ("nu", "ぬ"),
    ("ne", "ね"),
    ("no", "の"),
    ("ha", "は"),
    ("ba", "ば"),
    ("pa", "ぱ"),
    ("hi", "ひ"),
    ("hya", "ひゃ"),
    ("hyu", "ひゅ"),
    ("hyo", "ひょ"),
    ("bi", "び"),
    ("bya", "びゃ"),
    ("byu", "びゅ"),
    ("byo", "びょ"),
    ("pi", "ぴ"),
    ("pya", "ぴゃ"),
    ("pyu", "ぴゅ"),
    ("pyo", "ぴょ"),
    ("fu", "ふ"),
    ("fa", "ふぁ"),
    ("fi", "ふぃ"),
    ("fe", "ふぇ"),
    ("fo", "ふぉ"),
    ("hu", "ふ"),
    ("bu", "ぶ"),
    ("pu", "ぷ"),
    ("he", "へ"),
    ("be", "べ"),
    ("pe", "ぺ"),
    ("ho", "ほ"),
    ("bo", "ぼ"),
    ("po", "ぽ"),
    ("ma", "ま"),
    ("mi", "み"),
    ("mya", "みゃ"),
    ("myu", "みゅ"),
    ("myo", "みょ"),
    ("mu", "む"),
    ("me", "め"),
    ("mo", "も"),
    ("xya", "ゃ"),
    ("ya", "や"),
    ("xyu", "ゅ"),
    ("yu", "ゆ"),
    ("xyo", "ょ"),
    ("yo", "よ"),
    ("ra", "ら"),
    ("ri", "り"),
    ("rya", "りゃ"),
    ("ryu", "りゅ"),
    ("ryo", "りょ"),
    ("ru", "る"),
    ("re", "れ"),
    ("ro", "ろ"),
    ("xwa", "ゎ"),
    ("wa", "わ"),
    ("wo", "を"),
    ("n", "ん"),
    ("n'", "ん"),
    ("dyi", "でぃ"),
    ("-", "ー"),
    ("che", "ちぇ"),
    ("tye", "ちぇ"),
    ("cche", "っちぇ"),
    ("ttye", "っちぇ"),
    ("je", "じぇ"),
    ("zye", "じぇ"),
    ("dha", "でゃ"),
    ("dhi", "でぃ"),
    ("dhu", "でゅ"),
    ("dhe", "でぇ"),
    ("dho", "でょ"),
    ("tha", "てゃ"),
    ("thi", "てぃ"),
    ("thu", "てゅ"),
    ("the", "てぇ"),
    ("tho", "てょ"),
    (".", "。"),
    (",", "、"),
    ("[", "「"),
    ("]", "」"),
    ("z[", "『"),
    ("z]", "』"),
    ("z-", "〜"),
    ("z.", "…"),
    ("z,", "‥"),
    ("zh", "←"),
    ("zj", "↓"),
    ("zk", "↑"),
    ("zl", "→"),
    ("z/", "・"),
    ("wi", "うぃ"),
    ("we", "うぇ"),
];

/// ローマ字をひらがなに変換するコンバーター。
///
/// テーブルは構築時にユーザー設定で拡張できる。後から追加したエントリーが
/// デフォルトテーブルを上書きする。
pub struct RomkanConverter {
    mapping: HashMap<String, String>,
    romkan_pattern: Regex,
    double_n_pattern: Regex,
    // regex crate には先読みがないので、後続の 1 文字ごと書き換える。
    n_apostrophe_pattern: Regex,
    last_romaji_pattern: Regex,
}

impl RomkanConverter {
    pub fn new(additional: &[(String, String)]) -> Result<RomkanConverter> {
        let mut mapping: HashMap<String, String> = DEFAULT_ROMKAN
            .iter()
            .map(|(roma, kana)| (roma.to_string(), kana.to_string()))
            .collect();
        for (roma, kana) in additional {
            mapping.insert(roma.clone(), kana.clone());
        }

        // 長いローマ字列を先に照合させる。同じ長さの並びは辞書順で固定。
        let mut keys: Vec<&String> = mapping.keys().collect();
        keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let pattern = keys
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");
        let romkan_pattern = Regex::new(&pattern)?;

        Ok(RomkanConverter {
            mapping,
            romkan_pattern,
            double_n_pattern: Regex::new("nn")?,
            n_apostrophe_pattern: Regex::new("n'([^aiueoyn]|$)")?,
            last_romaji_pattern: Regex::new(
                r"(?:z[hjkl.,/\[\]-]|n+|[qwrtypsdfghjklzxcvbm]?[aiueo]|.)$",
            )?,
        })
    }

    /// `nn` を `n'` にしてから、母音等が続かない `n'` を素の `n` に戻す。
    fn normalize_double_n(&self, s: &str) -> String {
        let s = self.double_n_pattern.replace_all(s, "n'");
        self.n_apostrophe_pattern
            .replace_all(&s, "n$1")
            .into_owned()
    }

    pub fn to_hiragana(&self, s: &str) -> String {
        let s = s.to_lowercase();
        let s = self.normalize_double_n(&s);
        self.romkan_pattern
            .replace_all(&s, |caps: &Captures| self.mapping[&caps[0]].clone())
            .into_owned()
    }

    /// 末尾の入力単位を 1 つ削る。`zh` のような特殊入力、`n` の連なり、
    /// 子音+母音、どれでもなければ 1 文字。バックスペース処理用。
    pub fn remove_last_char(&self, s: &str) -> String {
        self.last_romaji_pattern.replace(s, "").into_owned()
    }
}

fn kana2romaji_table() -> &'static (Vec<String>, HashMap<String, String>) {
    static TABLE: OnceLock<(Vec<String>, HashMap<String, String>)> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut reverse: HashMap<String, String> = HashMap::new();
        for (roma, kana) in DEFAULT_ROMKAN {
            // 逆引きはかな表記のみを対象にする。句読点や記号はそのまま通す。
            if !kana.chars().all(|c| ('\u{3041}'..='\u{309f}').contains(&c)) {
                continue;
            }
            // 同じかなに複数のローマ字があるときは、短いもの・辞書順で
            // 先のものを正とする。
            let replace = match reverse.get(*kana) {
                Some(current) => (roma.len(), *roma) < (current.len(), current.as_str()),
                None => true,
            };
            if replace {
                reverse.insert(kana.to_string(), roma.to_string());
            }
        }
        let mut keys: Vec<String> = reverse.keys().cloned().collect();
        keys.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });
        (keys, reverse)
    })
}

/// かな文字列をローマ字に転写する。逆引きできない文字はそのまま残す。
/// 辞書にない読みのフォールバック候補（`ひょいー` → `hyoi-` 系）で使う。
pub fn kana2romaji(s: &str) -> String {
    let (keys, reverse) = kana2romaji_table();
    let chars: Vec<char> = s.chars().collect();
    let mut buf = String::new();
    let mut i = 0;
    while i < chars.len() {
        let mut matched = false;
        for key in keys {
            let klen = key.chars().count();
            if i + klen > chars.len() {
                continue;
            }
            let sub: String = chars[i..i + klen].iter().collect();
            if sub == *key {
                buf.push_str(&reverse[key]);
                i += klen;
                matched = true;
                break;
            }
        }
        if !matched {
            buf.push(chars[i]);
            i += 1;
        }
    }
    buf
}
