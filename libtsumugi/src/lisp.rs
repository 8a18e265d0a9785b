use std::collections::HashMap;
use std::collections::VecDeque;
use std::fmt::{Display, Formatter};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};

// 簡易 LISP インタープリタ。
// 辞書エントリーの動的な表層展開（日付など）にだけ使う。
// 変数定義もラムダもない。副作用は現在時刻の読み取りのみ。
// ref. http://norvig.com/lispy.html

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    Str(String),
    Symbol(String),
    DateTime(DateTime<Local>),
    List(Vec<Expr>),
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Int(v) => write!(f, "{}", v),
            Expr::Float(v) => write!(f, "{}", v),
            Expr::Str(v) => write!(f, "{}", v),
            Expr::Symbol(v) => write!(f, "{}", v),
            Expr::DateTime(v) => write!(f, "{}", v),
            Expr::List(v) => {
                let items: Vec<String> = v.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", items.join(" "))
            }
        }
    }
}

type Builtin = fn(&[Expr]) -> Result<Expr>;

pub struct Evaluator {
    env: HashMap<String, Builtin>,
}

impl Default for Evaluator {
    fn default() -> Self {
        let mut env: HashMap<String, Builtin> = HashMap::new();
        env.insert("+".to_string(), builtin_add);
        env.insert(".".to_string(), builtin_concat);
        env.insert("current-datetime".to_string(), builtin_current_datetime);
        env.insert("strftime".to_string(), builtin_strftime);
        Evaluator { env }
    }
}

impl Evaluator {
    pub fn eval(&self, expr: &Expr) -> Result<Expr> {
        match expr {
            Expr::List(items) => {
                let mut evaluated = Vec::with_capacity(items.len());
                for item in items {
                    evaluated.push(self.eval(item)?);
                }
                let Some(Expr::Symbol(name)) = evaluated.first() else {
                    bail!("Expected a function symbol at the head of list: {}", expr);
                };
                let func = self
                    .env
                    .get(name.as_str())
                    .with_context(|| format!("Unknown function: {}", name))?;
                func(&evaluated[1..])
            }
            _ => Ok(expr.clone()),
        }
    }

    pub fn run(&self, sexp: &str) -> Result<String> {
        let expr = parse(sexp)?;
        Ok(self.eval(&expr)?.to_string())
    }
}

fn builtin_add(args: &[Expr]) -> Result<Expr> {
    match args {
        [Expr::Int(a), Expr::Int(b)] => Ok(Expr::Int(a + b)),
        [Expr::Int(a), Expr::Float(b)] => Ok(Expr::Float(*a as f64 + b)),
        [Expr::Float(a), Expr::Int(b)] => Ok(Expr::Float(a + *b as f64)),
        [Expr::Float(a), Expr::Float(b)] => Ok(Expr::Float(a + b)),
        _ => bail!("`+` expects two numbers"),
    }
}

fn builtin_concat(args: &[Expr]) -> Result<Expr> {
    let mut buf = String::new();
    for arg in args {
        buf.push_str(&arg.to_string());
    }
    Ok(Expr::Str(buf))
}

fn builtin_current_datetime(args: &[Expr]) -> Result<Expr> {
    if !args.is_empty() {
        bail!("`current-datetime` takes no arguments");
    }
    Ok(Expr::DateTime(Local::now()))
}

fn builtin_strftime(args: &[Expr]) -> Result<Expr> {
    match args {
        [Expr::DateTime(dt), Expr::Str(fmt)] => Ok(Expr::Str(dt.format(fmt).to_string())),
        _ => bail!("`strftime` expects a datetime and a format string"),
    }
}

pub fn parse(s: &str) -> Result<Expr> {
    let mut tokens = tokenize(s);
    read_from(&mut tokens)
}

fn tokenize(s: &str) -> VecDeque<String> {
    s.replace('(', " ( ")
        .replace(')', " ) ")
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

fn read_from(tokens: &mut VecDeque<String>) -> Result<Expr> {
    let Some(token) = tokens.pop_front() else {
        bail!("Unexpected EOF while reading");
    };
    match token.as_str() {
        "(" => {
            let mut values = Vec::new();
            loop {
                match tokens.front().map(|t| t.as_str()) {
                    Some(")") => {
                        tokens.pop_front();
                        return Ok(Expr::List(values));
                    }
                    Some(_) => values.push(read_from(tokens)?),
                    None => bail!("Unexpected EOF while reading a list"),
                }
            }
        }
        ")" => bail!("Unexpected `)`"),
        _ => Ok(atom(&token)),
    }
}

fn atom(token: &str) -> Expr {
    if let Ok(v) = token.parse::<i64>() {
        return Expr::Int(v);
    }
    if let Ok(v) = token.parse::<f64>() {
        return Expr::Float(v);
    }
    if let Some(stripped) = token.strip_prefix('"') {
        return Expr::Str(stripped.trim_end_matches('"').to_string());
    }
    Expr::Symbol(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() -> Result<()> {
        let ast = parse("(+ 1 2)")?;
        assert_eq!(
            ast,
            Expr::List(vec![
                Expr::Symbol("+".to_string()),
                Expr::Int(1),
                Expr::Int(2)
            ])
        );
        Ok(())
    }

    #[test]
    fn test_add() -> Result<()> {
        let evaluator = Evaluator::default();
        assert_eq!(evaluator.run("(+ 1 2)")?, "3");
        Ok(())
    }

    #[test]
    fn test_concat() -> Result<()> {
        let evaluator = Evaluator::default();
        assert_eq!(evaluator.run(r#"(. "令和" "元年")"#)?, "令和元年");
        Ok(())
    }

    #[test]
    fn test_strftime() -> Result<()> {
        let evaluator = Evaluator::default();
        let got = evaluator.run(r#"(strftime (current-datetime) "%Y-%m-%d")"#)?;
        assert_eq!(got, Local::now().format("%Y-%m-%d").to_string());
        Ok(())
    }

    #[test]
    fn test_unknown_function() {
        let evaluator = Evaluator::default();
        assert!(evaluator.run("(frobnicate 1)").is_err());
    }
}
