// Formula parser - converts expression text into an AST
// Supports: numbers (scientific notation included), cell refs (A1),
// unary +/-, basic math (+, -, *, /), parentheses

use crate::error::ParseError;
use crate::position::Position;

/// Expression AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Reference to another cell. Always a valid position; the tokenizer
    /// rejects references it cannot decode.
    Ref(Position),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn symbol(self) -> char {
        match self {
            Op::Add => '+',
            Op::Sub => '-',
            Op::Mul => '*',
            Op::Div => '/',
        }
    }
}

/// Parse expression text (without any leading `=`; the sigil is the cell
/// layer's concern). The whole input must be consumed.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    let (expr, pos) = parse_add_sub(&tokens, 0)?;
    if pos != tokens.len() {
        return Err(ParseError::TrailingInput);
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    CellRef(Position),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '+' => {
                tokens.push(Token::Plus);
                chars.next();
            }
            '-' => {
                tokens.push(Token::Minus);
                chars.next();
            }
            '*' => {
                tokens.push(Token::Star);
                chars.next();
            }
            '/' => {
                tokens.push(Token::Slash);
                chars.next();
            }
            '(' => {
                tokens.push(Token::LParen);
                chars.next();
            }
            ')' => {
                tokens.push(Token::RParen);
                chars.next();
            }
            'A'..='Z' | 'a'..='z' => {
                // Maximal letters-then-digits run; it must decode to a valid
                // cell position or the whole parse fails.
                let mut text = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphabetic() {
                        text.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_digit() {
                        text.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match Position::from_text(&text) {
                    Some(pos) => tokens.push(Token::CellRef(pos)),
                    None => return Err(ParseError::InvalidReference(text)),
                }
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                // Optional exponent: e/E, optional sign, digits. Consumed
                // only when the digits are actually there, so `12e` leaves
                // the `e` for the reference tokenizer to reject.
                if matches!(chars.peek(), Some('e') | Some('E')) {
                    let mut lookahead = chars.clone();
                    let marker = lookahead.next().unwrap();
                    let mut exponent = String::new();
                    if matches!(lookahead.peek(), Some('+') | Some('-')) {
                        exponent.push(lookahead.next().unwrap());
                    }
                    if matches!(lookahead.peek(), Some(d) if d.is_ascii_digit()) {
                        while let Some(&d) = lookahead.peek() {
                            if d.is_ascii_digit() {
                                exponent.push(d);
                                lookahead.next();
                            } else {
                                break;
                            }
                        }
                        num_str.push(marker);
                        num_str.push_str(&exponent);
                        chars = lookahead;
                    }
                }
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| ParseError::InvalidNumber(num_str.clone()))?;
                if !num.is_finite() {
                    // Literals past f64 range parse to infinity; reject them
                    // here so evaluation only ever starts from finite inputs.
                    return Err(ParseError::InvalidNumber(num_str));
                }
                tokens.push(Token::Number(num));
            }
            _ => return Err(ParseError::UnexpectedChar(c)),
        }
    }

    Ok(tokens)
}

fn parse_add_sub(tokens: &[Token], pos: usize) -> Result<(Expr, usize), ParseError> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos)?;

    while pos < tokens.len() {
        let op = match tokens[pos] {
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize) -> Result<(Expr, usize), ParseError> {
    let (mut left, mut pos) = parse_factor(tokens, pos)?;

    while pos < tokens.len() {
        let op = match tokens[pos] {
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            _ => break,
        };
        let (right, new_pos) = parse_factor(tokens, pos + 1)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_factor(tokens: &[Token], pos: usize) -> Result<(Expr, usize), ParseError> {
    match tokens.get(pos) {
        None => Err(ParseError::UnexpectedEnd),
        Some(Token::Minus) => {
            let (operand, pos) = parse_factor(tokens, pos + 1)?;
            Ok((
                Expr::Unary {
                    op: UnaryOp::Minus,
                    operand: Box::new(operand),
                },
                pos,
            ))
        }
        Some(Token::Plus) => {
            let (operand, pos) = parse_factor(tokens, pos + 1)?;
            Ok((
                Expr::Unary {
                    op: UnaryOp::Plus,
                    operand: Box::new(operand),
                },
                pos,
            ))
        }
        Some(Token::Number(n)) => Ok((Expr::Number(*n), pos + 1)),
        Some(Token::CellRef(p)) => Ok((Expr::Ref(*p), pos + 1)),
        Some(Token::LParen) => {
            let (expr, pos) = parse_add_sub(tokens, pos + 1)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((expr, pos + 1)),
                _ => Err(ParseError::UnclosedParen),
            }
        }
        Some(_) => Err(ParseError::UnexpectedToken),
    }
}

// =============================================================================
// Canonical printing
// =============================================================================

/// Format an expression in canonical form: no whitespace, parentheses only
/// where removing them would change the parse.
pub fn format_expr(expr: &Expr) -> String {
    let mut out = String::new();
    write_expr(expr, &mut out);
    out
}

/// Binding strength. Atoms never need parentheses, unary signs bind tighter
/// than any binary operator.
fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Number(_) | Expr::Ref(_) => 4,
        Expr::Unary { .. } => 3,
        Expr::BinaryOp { op: Op::Mul | Op::Div, .. } => 2,
        Expr::BinaryOp { op: Op::Add | Op::Sub, .. } => 1,
    }
}

fn write_expr(expr: &Expr, out: &mut String) {
    match expr {
        Expr::Number(n) => out.push_str(&format_number(*n)),
        Expr::Ref(pos) => out.push_str(&pos.to_text()),
        Expr::Unary { op, operand } => {
            out.push(match op {
                UnaryOp::Plus => '+',
                UnaryOp::Minus => '-',
            });
            // A binary operand would otherwise capture the sign: `-(1+2)`
            // reads back differently from `-1+2`.
            if matches!(operand.as_ref(), Expr::BinaryOp { .. }) {
                out.push('(');
                write_expr(operand, out);
                out.push(')');
            } else {
                write_expr(operand, out);
            }
        }
        Expr::BinaryOp { op, left, right } => {
            let prec = precedence(expr);
            write_operand(left, prec, false, out);
            out.push(op.symbol());
            // Subtraction and division are left-associative, so an
            // equal-precedence right operand keeps its parentheses.
            write_operand(right, prec, matches!(op, Op::Sub | Op::Div), out);
        }
    }
}

fn write_operand(child: &Expr, parent_prec: u8, right_of_noncommutative: bool, out: &mut String) {
    let child_prec = precedence(child);
    let parens = child_prec < parent_prec || (child_prec == parent_prec && right_of_noncommutative);
    if parens {
        out.push('(');
        write_expr(child, out);
        out.push(')');
    } else {
        write_expr(child, out);
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

// =============================================================================
// Cell reference extraction
// =============================================================================

/// All cell references in the expression, de-duplicated, in row-major order.
pub fn referenced_cells(expr: &Expr) -> Vec<Position> {
    let mut refs = Vec::new();
    collect_refs(expr, &mut refs);
    refs.sort();
    refs.dedup();
    refs
}

fn collect_refs(expr: &Expr, refs: &mut Vec<Position>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Ref(pos) => refs.push(*pos),
        Expr::Unary { operand, .. } => collect_refs(operand, refs),
        Expr::BinaryOp { left, right, .. } => {
            collect_refs(left, refs);
            collect_refs(right, refs);
        }
    }
}
