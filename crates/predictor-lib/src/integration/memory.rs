//! In-memory integration
//!
//! Holds named tables in memory and answers the narrow query shape used for
//! data fetching: `select <*|cols> from <table> [where c = v [and ...]] [limit n]`.

use super::Integration;
use crate::error::{Error, Result};
use crate::models::{RowSet, Value};
use async_trait::async_trait;
use dashmap::DashMap;

/// Integration backed by in-memory tables
pub struct MemoryIntegration {
    name: String,
    tables: DashMap<String, RowSet>,
}

impl MemoryIntegration {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: DashMap::new(),
        }
    }

    /// Create or replace a table
    pub fn insert_table(&self, table: impl Into<String>, rows: RowSet) {
        self.tables.insert(table.into(), rows);
    }

    pub fn drop_table(&self, table: &str) -> bool {
        self.tables.remove(table).is_some()
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// Run a parsed query against the stored tables
    pub fn execute(&self, query: &TableQuery) -> Result<RowSet> {
        let table = self
            .tables
            .get(&query.table)
            .ok_or_else(|| Error::NotFound(query.table.clone()))?;

        let filter_indexes = query
            .filters
            .iter()
            .map(|(column, value)| {
                table
                    .column_index(column)
                    .map(|i| (i, value))
                    .ok_or_else(|| unknown_column(column))
            })
            .collect::<Result<Vec<_>>>()?;

        let (columns, projection): (Vec<String>, Vec<usize>) = match &query.columns {
            None => (table.columns.clone(), (0..table.columns.len()).collect()),
            Some(cols) => {
                let indexes = cols
                    .iter()
                    .map(|c| table.column_index(c).ok_or_else(|| unknown_column(c)))
                    .collect::<Result<Vec<_>>>()?;
                (cols.clone(), indexes)
            }
        };

        let limit = query.limit.unwrap_or(usize::MAX);
        let rows = table
            .rows
            .iter()
            .filter(|row| {
                filter_indexes
                    .iter()
                    .all(|(i, expected)| row.get(*i).is_some_and(|v| v.loosely_equals(expected)))
            })
            .take(limit)
            .map(|row| projection.iter().map(|&i| row[i].clone()).collect())
            .collect();

        Ok(RowSet::new(columns, rows))
    }
}

fn unknown_column(column: &str) -> Error {
    Error::InvalidStatement(format!("unknown column '{}'", column))
}

#[async_trait]
impl Integration for MemoryIntegration {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, query: &str) -> Result<RowSet> {
        let parsed = TableQuery::parse(query)?;
        self.execute(&parsed)
    }
}

/// Parsed data-fetch query
#[derive(Debug, Clone, PartialEq)]
pub struct TableQuery {
    /// `None` selects every column
    pub columns: Option<Vec<String>>,
    pub table: String,
    pub filters: Vec<(String, Value)>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Word(String),
    Str(String),
    Num(String),
    Sym(char),
}

impl TableQuery {
    pub fn parse(query: &str) -> Result<Self> {
        let tokens = tokenize(query)?;
        let mut p = Parser { tokens, pos: 0 };

        p.keyword("select")?;
        let columns = if p.eat_sym('*') {
            None
        } else {
            let mut cols = vec![p.word()?];
            while p.eat_sym(',') {
                cols.push(p.word()?);
            }
            Some(cols)
        };
        p.keyword("from")?;
        let table = p.word()?;

        let mut filters = Vec::new();
        if p.eat_keyword("where") {
            loop {
                let column = p.word()?;
                if !p.eat_sym('=') {
                    return Err(bad_query("only equality conditions are supported"));
                }
                filters.push((column, p.literal()?));
                if !p.eat_keyword("and") {
                    break;
                }
            }
        }

        let limit = if p.eat_keyword("limit") {
            match p.next() {
                Some(Token::Num(n)) => Some(
                    n.parse::<usize>()
                        .map_err(|_| bad_query("limit must be a non-negative integer"))?,
                ),
                _ => return Err(bad_query("limit must be a non-negative integer")),
            }
        } else {
            None
        };

        p.eat_sym(';');
        if p.pos != p.tokens.len() {
            return Err(bad_query("unexpected trailing input"));
        }

        Ok(Self {
            columns,
            table,
            filters,
            limit,
        })
    }
}

fn bad_query(reason: &str) -> Error {
    Error::InvalidStatement(format!("unsupported data query: {}", reason))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn word(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Word(w)) => Ok(w),
            _ => Err(bad_query("expected identifier")),
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        match self.peek() {
            Some(Token::Word(w)) if w.eq_ignore_ascii_case(keyword) => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn keyword(&mut self, keyword: &str) -> Result<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            Err(bad_query(&format!("expected '{}'", keyword)))
        }
    }

    fn eat_sym(&mut self, sym: char) -> bool {
        if self.peek() == Some(&Token::Sym(sym)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn literal(&mut self) -> Result<Value> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::Text(s)),
            Some(Token::Num(n)) => {
                if let Ok(i) = n.parse::<i64>() {
                    Ok(Value::Integer(i))
                } else {
                    n.parse::<f64>()
                        .map(Value::Float)
                        .map_err(|_| bad_query("invalid number"))
                }
            }
            Some(Token::Word(w)) => match w.to_ascii_lowercase().as_str() {
                "true" => Ok(Value::Boolean(true)),
                "false" => Ok(Value::Boolean(false)),
                "null" => Ok(Value::Null),
                _ => Err(bad_query("expected literal")),
            },
            _ => Err(bad_query("expected literal")),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '\'' {
            chars.next();
            let mut s = String::new();
            loop {
                match chars.next() {
                    Some('\'') if chars.peek() == Some(&'\'') => {
                        chars.next();
                        s.push('\'');
                    }
                    Some('\'') => break,
                    Some(ch) => s.push(ch),
                    None => return Err(bad_query("unterminated string literal")),
                }
            }
            tokens.push(Token::Str(s));
        } else if c.is_ascii_digit() || c == '-' {
            let mut n = String::new();
            n.push(c);
            chars.next();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    n.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Num(n));
        } else if c.is_alphanumeric() || c == '_' || c == '"' || c == '`' {
            let mut w = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' || d == '.' {
                    w.push(d);
                    chars.next();
                } else if d == '"' || d == '`' {
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Word(w));
        } else if matches!(c, '*' | ',' | '=' | ';') {
            tokens.push(Token::Sym(c));
            chars.next();
        } else {
            return Err(bad_query(&format!("unexpected character '{}'", c)));
        }
    }

    Ok(tokens)
}
