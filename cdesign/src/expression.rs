use crate::{Error, Result};
use num_dual::{Dual64, DualNum};

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Function {
    Exp,
    Log,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Abs,
}

impl Function {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "exp" => Some(Function::Exp),
            "log" | "ln" => Some(Function::Log),
            "sqrt" => Some(Function::Sqrt),
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "tan" => Some(Function::Tan),
            "abs" => Some(Function::Abs),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Variable(usize),
    Neg(Box<Node>),
    Binary(BinaryOp, Box<Node>, Box<Node>),
    Call(Function, Box<Node>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Pow,
    LParen,
    RParen,
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>> {
    let bytes = source.as_bytes();
    let mut tokens = vec![];
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        match c {
            ' ' | '\t' | '\n' => {
                i += 1;
                continue;
            }
            '+' => tokens.push((start, Token::Plus)),
            '-' => tokens.push((start, Token::Minus)),
            '/' => tokens.push((start, Token::Slash)),
            '^' => tokens.push((start, Token::Pow)),
            '(' => tokens.push((start, Token::LParen)),
            ')' => tokens.push((start, Token::RParen)),
            '*' => {
                if bytes.get(i + 1) == Some(&b'*') {
                    i += 1;
                    tokens.push((start, Token::Pow));
                } else {
                    tokens.push((start, Token::Star));
                }
            }
            '0'..='9' | '.' => {
                while i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.') {
                    i += 1;
                }
                if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                    if j < bytes.len() && bytes[j].is_ascii_digit() {
                        i = j;
                        while i < bytes.len() && bytes[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let literal = &source[start..i];
                let value = literal.parse::<f64>().map_err(|_| Error::ExpressionParse {
                    expression: source.to_string(),
                    position: start,
                    message: format!("invalid number `{literal}`"),
                })?;
                tokens.push((start, Token::Number(value)));
                continue;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                tokens.push((start, Token::Ident(source[start..i].to_string())));
                continue;
            }
            c => {
                return Err(Error::ExpressionParse {
                    expression: source.to_string(),
                    position: start,
                    message: format!("unexpected character `{c}`"),
                });
            }
        }
        i += 1;
    }
    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(usize, Token)>,
    pos: usize,
    variables: Vec<String>,
    collect_variables: bool,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> Error {
        let position = self
            .tokens
            .get(self.pos)
            .map(|(p, _)| *p)
            .unwrap_or(self.source.len());
        Error::ExpressionParse {
            expression: self.source.to_string(),
            position,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        t
    }

    fn expression(&mut self) -> Result<Node> {
        let mut lhs = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinaryOp::Add),
            Some(Token::Minus) => Some(BinaryOp::Sub),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Node> {
        let mut lhs = self.unary()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinaryOp::Mul),
            Some(Token::Slash) => Some(BinaryOp::Div),
            _ => None,
        } {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Node::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    // right associative, binds tighter than unary minus on its left
    fn power(&mut self) -> Result<Node> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let exponent = self.unary()?;
            return Ok(Node::Binary(
                BinaryOp::Pow,
                Box::new(base),
                Box::new(exponent),
            ));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<Node> {
        match self.next() {
            Some(Token::Number(v)) => Ok(Node::Number(v)),
            Some(Token::LParen) => {
                let inner = self.expression()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => {
                        self.pos -= 1;
                        Err(self.error("expected `)`"))
                    }
                }
            }
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    let function = Function::from_name(&name).ok_or_else(|| {
                        self.pos -= 1;
                        self.error(format!("unknown function `{name}`"))
                    })?;
                    self.pos += 1;
                    let arg = self.expression()?;
                    return match self.next() {
                        Some(Token::RParen) => Ok(Node::Call(function, Box::new(arg))),
                        _ => {
                            self.pos -= 1;
                            Err(self.error("expected `)`"))
                        }
                    };
                }
                match self.variables.iter().position(|v| *v == name) {
                    Some(idx) => Ok(Node::Variable(idx)),
                    None if self.collect_variables => {
                        self.variables.push(name);
                        Ok(Node::Variable(self.variables.len() - 1))
                    }
                    None => Err(Error::UnknownKey {
                        key: name,
                        context: format!("expression `{}`", self.source),
                    }),
                }
            }
            _ => {
                self.pos -= 1;
                Err(self.error("expected number, variable or `(`"))
            }
        }
    }
}

fn eval_node<D: DualNum<f64>>(node: &Node, x: &[D]) -> D {
    match node {
        Node::Number(v) => D::from(*v),
        Node::Variable(i) => x[*i].clone(),
        Node::Neg(a) => -eval_node(a, x),
        Node::Binary(op, a, b) => {
            let lhs = eval_node(a, x);
            match (op, b.as_ref()) {
                (BinaryOp::Pow, Node::Number(e)) if e.fract() == 0. && e.abs() < 64. => {
                    lhs.powi(*e as i32)
                }
                (BinaryOp::Pow, Node::Number(e)) => lhs.powf(*e),
                (BinaryOp::Pow, _) => (eval_node(b, x) * lhs.ln()).exp(),
                (BinaryOp::Add, _) => lhs + eval_node(b, x),
                (BinaryOp::Sub, _) => lhs - eval_node(b, x),
                (BinaryOp::Mul, _) => lhs * eval_node(b, x),
                (BinaryOp::Div, _) => lhs / eval_node(b, x),
            }
        }
        Node::Call(f, a) => {
            let v = eval_node(a, x);
            match f {
                Function::Exp => v.exp(),
                Function::Log => v.ln(),
                Function::Sqrt => v.sqrt(),
                Function::Sin => v.sin(),
                Function::Cos => v.cos(),
                Function::Tan => v.tan(),
                Function::Abs => {
                    if v.re() < 0. {
                        -v
                    } else {
                        v
                    }
                }
            }
        }
    }
}

fn monomial_of(node: &Node, out: &mut Vec<(usize, u32)>) -> bool {
    match node {
        Node::Variable(i) => {
            match out.iter_mut().find(|(v, _)| v == i) {
                Some((_, p)) => *p += 1,
                None => out.push((*i, 1)),
            }
            true
        }
        Node::Number(v) => *v == 1.,
        Node::Binary(BinaryOp::Mul, a, b) => monomial_of(a, out) && monomial_of(b, out),
        Node::Binary(BinaryOp::Pow, a, b) => match b.as_ref() {
            Node::Number(e) if e.fract() == 0. && *e >= 1. => {
                let mut inner = vec![];
                if !monomial_of(a, &mut inner) {
                    return false;
                }
                for (i, p) in inner {
                    let p = p * (*e as u32);
                    match out.iter_mut().find(|(v, _)| *v == i) {
                        Some((_, q)) => *q += p,
                        None => out.push((i, p)),
                    }
                }
                true
            }
            _ => false,
        },
        _ => false,
    }
}

/// Algebraic expression over named variables.
///
/// Supports `+ - * /`, powers written as `**` or `^`, unary minus, parentheses, numeric
/// literals and the functions `exp`, `log`/`ln`, `sqrt`, `sin`, `cos`, `tan` and `abs`. The
/// expression is parsed once and can be evaluated for any [DualNum], which yields exact
/// derivatives.
///
/// ```
/// use cdesign::Expression;
///
/// let expr = Expression::parse("x1**2 + 2 * x2", &["x1".into(), "x2".into()]).unwrap();
/// let (val, grad) = expr.value_grad(&[3., 1.]);
/// assert_eq!(val, 11.);
/// assert_eq!(grad, vec![6., 2.]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    variables: Vec<String>,
    root: Node,
}

impl Expression {
    /// Parses `source`, every identifier must be part of `variables`, which also defines the
    /// positional order of evaluation arguments.
    pub fn parse(source: &str, variables: &[String]) -> Result<Self> {
        Self::parse_impl(source, variables.to_vec(), false)
    }

    /// Parses `source` and collects its identifiers in order of first appearance.
    pub fn parse_free(source: &str) -> Result<Self> {
        Self::parse_impl(source, vec![], true)
    }

    fn parse_impl(source: &str, variables: Vec<String>, collect_variables: bool) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            pos: 0,
            variables,
            collect_variables,
        };
        let root = parser.expression()?;
        if parser.pos < parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Self {
            source: source.to_string(),
            variables: parser.variables,
            root,
        })
    }

    /// Source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Variables in argument order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Evaluates the expression for generic dual numbers.
    pub fn eval<D: DualNum<f64>>(&self, x: &[D]) -> D {
        eval_node(&self.root, x)
    }

    /// Returns the value at `x`.
    pub fn value(&self, x: &[f64]) -> f64 {
        self.eval(x)
    }

    /// Returns value and exact gradient at `x`.
    pub fn value_grad(&self, x: &[f64]) -> (f64, Vec<f64>) {
        let mut val = self.value(x);
        let grad = (0..x.len())
            .map(|i| {
                let xd: Vec<Dual64> = x
                    .iter()
                    .enumerate()
                    .map(|(j, v)| Dual64::new(*v, if i == j { 1. } else { 0. }))
                    .collect();
                let d = self.eval(&xd);
                val = d.re;
                d.eps
            })
            .collect();
        (val, grad)
    }

    /// Returns the expression as product of variable powers, e.g. `x1*x2**2` becomes
    /// `[(0, 1), (1, 2)]`, or `None` if it is not a monomial.
    pub fn monomial(&self) -> Option<Vec<(usize, u32)>> {
        let mut out = vec![];
        match monomial_of(&self.root, &mut out) && !out.is_empty() {
            true => Some(out),
            false => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EQ_EPS: f64 = 1e-10;

    fn vars(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn precedence() -> Result<()> {
        let e = Expression::parse("-x**2 + 2*x - 3/x", &vars(&["x"]))?;
        assert!((e.value(&[3.]) - (-9. + 6. - 1.)).abs() < EQ_EPS);
        let e = Expression::parse("2^3^2", &[])?;
        assert_eq!(e.value(&[]), 512.);
        let e = Expression::parse("(1 + 2) * 3 - -1", &[])?;
        assert_eq!(e.value(&[]), 10.);
        let e = Expression::parse("1.5e1 + .5", &[])?;
        assert_eq!(e.value(&[]), 15.5);
        Ok(())
    }

    #[test]
    fn functions_and_gradient() -> Result<()> {
        let e = Expression::parse(
            "exp(a) + log(b) + sqrt(b) + sin(a) * cos(a) + tan(a) + abs(a - 2)",
            &vars(&["a", "b"]),
        )?;
        let (a, b) = (0.3_f64, 4.);
        let (val, grad) = e.value_grad(&[a, b]);
        let expected =
            a.exp() + b.ln() + b.sqrt() + a.sin() * a.cos() + a.tan() + (a - 2.).abs();
        assert!((val - expected).abs() < EQ_EPS);
        let da = a.exp() + (a.cos().powi(2) - a.sin().powi(2)) + 1. / a.cos().powi(2) - 1.;
        let db = 1. / b + 0.5 / b.sqrt();
        assert!((grad[0] - da).abs() < 1e-8);
        assert!((grad[1] - db).abs() < 1e-8);
        Ok(())
    }

    #[test]
    fn variable_power() -> Result<()> {
        let e = Expression::parse("x^y", &vars(&["x", "y"]))?;
        let (val, grad) = e.value_grad(&[2., 3.]);
        assert!((val - 8.).abs() < EQ_EPS);
        assert!((grad[0] - 12.).abs() < 1e-8);
        assert!((grad[1] - 8. * 2_f64.ln()).abs() < 1e-8);
        Ok(())
    }

    #[test]
    fn parse_errors() {
        assert!(matches!(
            Expression::parse("x +", &vars(&["x"])),
            Err(Error::ExpressionParse { position: 3, .. })
        ));
        assert!(matches!(
            Expression::parse("x + y", &vars(&["x"])),
            Err(Error::UnknownKey { .. })
        ));
        assert!(matches!(
            Expression::parse("foo(x)", &vars(&["x"])),
            Err(Error::ExpressionParse { .. })
        ));
        assert!(matches!(
            Expression::parse("x $ 2", &vars(&["x"])),
            Err(Error::ExpressionParse { position: 2, .. })
        ));
        assert!(Expression::parse("(x", &vars(&["x"])).is_err());
    }

    #[test]
    fn monomials() -> Result<()> {
        let e = Expression::parse_free("x3**2")?;
        assert_eq!(e.variables(), &vars(&["x3"]));
        assert_eq!(e.monomial(), Some(vec![(0, 2)]));
        let e = Expression::parse_free("a*b**2*a")?;
        assert_eq!(e.monomial(), Some(vec![(0, 2), (1, 2)]));
        let e = Expression::parse_free("(a*b)^2")?;
        assert_eq!(e.monomial(), Some(vec![(0, 2), (1, 2)]));
        assert_eq!(Expression::parse_free("a + b")?.monomial(), None);
        assert_eq!(Expression::parse_free("exp(a)")?.monomial(), None);
        Ok(())
    }
}
