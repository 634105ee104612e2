//! A small recursive-descent parser for surface equations such as
//! `"x^2 + y^2 + z^2 - 1"`.

use crate::error::ParseError;

use super::expr::{Expr, Func};

pub fn parse_expr(source: &str) -> Result<Expr, ParseError> {
    let mut parser = Parser { chars: source.chars().collect(), pos: 0 };
    let expr = parser.sum()?;
    parser.skip_ws();
    match parser.peek() {
        None => Ok(expr),
        Some(found) => Err(ParseError::UnexpectedChar { position: parser.pos, found }),
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<(), ParseError> {
        if self.eat(c) {
            return Ok(());
        }
        match self.peek() {
            Some(found) => Err(ParseError::UnexpectedChar { position: self.pos, found }),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn sum(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.product()?;
        loop {
            if self.eat('+') {
                lhs = lhs + self.product()?;
            } else if self.eat('-') {
                lhs = lhs - self.product()?;
            } else {
                return Ok(lhs);
            }
        }
    }

    fn product(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            self.skip_ws();
            // `**` is a power, not a product
            if self.peek() == Some('*') && self.chars.get(self.pos + 1) != Some(&'*') {
                self.pos += 1;
                lhs = lhs * self.unary()?;
            } else if self.eat('/') {
                lhs = lhs / self.unary()?;
            } else {
                return Ok(lhs);
            }
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        if self.eat('-') {
            return Ok(-self.unary()?);
        }
        self.power()
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.atom()?;
        self.skip_ws();
        let is_pow = if self.peek() == Some('^') {
            self.pos += 1;
            true
        } else if self.peek() == Some('*') && self.chars.get(self.pos + 1) == Some(&'*') {
            self.pos += 2;
            true
        } else {
            false
        };
        if !is_pow {
            return Ok(base);
        }

        let negative = self.eat('-');
        self.skip_ws();
        let exponent = self.number()?;
        if exponent.fract() != 0.0 {
            return Err(ParseError::NonIntegerExponent(exponent));
        }
        let n = exponent as i32;
        Ok(base.powi(if negative { -n } else { n }))
    }

    fn number(&mut self) -> Result<f32, ParseError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        // exponent suffix, e.g. 1e-3
        if self.peek().is_some_and(|c| c == 'e' || c == 'E')
            && self.chars.get(self.pos + 1).is_some_and(|c| c.is_ascii_digit() || *c == '-' || *c == '+')
        {
            self.pos += 2;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f32>().map_err(|_| match self.chars.get(start) {
            Some(&found) => ParseError::UnexpectedChar { position: start, found },
            None => ParseError::UnexpectedEnd,
        })
    }

    fn atom(&mut self) -> Result<Expr, ParseError> {
        self.skip_ws();
        let Some(c) = self.peek() else {
            return Err(ParseError::UnexpectedEnd);
        };

        if c == '(' {
            self.pos += 1;
            let inner = self.sum()?;
            self.expect(')')?;
            return Ok(inner);
        }
        if c.is_ascii_digit() || c == '.' {
            return Ok(Expr::constant(self.number()?));
        }
        if !c.is_ascii_alphabetic() {
            return Err(ParseError::UnexpectedChar { position: self.pos, found: c });
        }

        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        let ident: String = self.chars[start..self.pos].iter().collect();
        match ident.as_str() {
            "x" => return Ok(Expr::x()),
            "y" => return Ok(Expr::y()),
            "z" => return Ok(Expr::z()),
            "pi" => return Ok(Expr::constant(std::f32::consts::PI)),
            _ => {}
        }

        self.expect('(')?;
        let first = self.sum()?;
        let expr = match ident.as_str() {
            "min" | "max" => {
                self.expect(',')?;
                let second = self.sum()?;
                if ident == "min" { first.min(second) } else { first.max(second) }
            }
            "sqrt" => first.call(Func::Sqrt),
            "abs" => first.call(Func::Abs),
            "sin" => first.call(Func::Sin),
            "cos" => first.call(Func::Cos),
            "exp" => first.call(Func::Exp),
            "ln" | "log" => first.call(Func::Ln),
            _ => return Err(ParseError::UnknownIdentifier(ident)),
        };
        self.expect(')')?;
        Ok(expr)
    }
}
