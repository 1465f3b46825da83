use crate::{Domain, Error, Expression, Result};
use std::fmt::Display;

/// A single regressor of a linear model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelTerm {
    /// Constant one.
    Intercept,
    /// Product of distinct variables, a main effect if it has a single factor.
    Interaction(Vec<String>),
    /// Braced algebraic term such as `{x**2}`.
    Transform {
        /// Normalized source without braces and whitespace.
        name: String,
        /// Parsed expression over its own variables.
        expression: Expression,
    },
}

impl ModelTerm {
    /// Creates a main effect term.
    pub fn main_effect(key: &str) -> Self {
        ModelTerm::Interaction(vec![key.to_string()])
    }

    /// Creates a braced term from the expression inside the braces.
    pub fn transform(source: &str) -> Result<Self> {
        let name: String = source.chars().filter(|c| !c.is_whitespace()).collect();
        let expression = Expression::parse_free(&name)?;
        Ok(ModelTerm::Transform { name, expression })
    }

    /// Name of the term, e.g. `1`, `x1`, `x3**2` or `x1:x2`.
    pub fn name(&self) -> String {
        match self {
            ModelTerm::Intercept => "1".to_string(),
            ModelTerm::Interaction(factors) => factors.join(":"),
            ModelTerm::Transform { name, .. } => name.clone(),
        }
    }

    /// Order used for sorting: zero for the intercept, one for braced terms and the number of
    /// factors for interactions.
    pub fn order(&self) -> usize {
        match self {
            ModelTerm::Intercept => 0,
            ModelTerm::Interaction(factors) => factors.len(),
            ModelTerm::Transform { .. } => 1,
        }
    }

    /// Variables the term depends on.
    pub fn variables(&self) -> &[String] {
        match self {
            ModelTerm::Intercept => &[],
            ModelTerm::Interaction(factors) => factors,
            ModelTerm::Transform { expression, .. } => expression.variables(),
        }
    }

    fn canonical(&self) -> String {
        match self {
            ModelTerm::Interaction(factors) => {
                let mut f = factors.clone();
                f.sort();
                f.join(":")
            }
            _ => self.name(),
        }
    }

    /// Value at `x`, given in the order of [ModelTerm::variables].
    pub fn value(&self, x: &[f64]) -> f64 {
        match self {
            ModelTerm::Intercept => 1.,
            ModelTerm::Interaction(_) => x.iter().product(),
            ModelTerm::Transform { expression, .. } => expression.value(x),
        }
    }

    /// Value and gradient at `x`, given in the order of [ModelTerm::variables].
    pub fn value_grad(&self, x: &[f64]) -> (f64, Vec<f64>) {
        match self {
            ModelTerm::Intercept => (1., vec![]),
            ModelTerm::Interaction(_) => {
                let grad = (0..x.len())
                    .map(|i| {
                        x.iter()
                            .enumerate()
                            .filter(|(j, _)| *j != i)
                            .map(|(_, v)| v)
                            .product()
                    })
                    .collect();
                (x.iter().product(), grad)
            }
            ModelTerm::Transform { expression, .. } => expression.value_grad(x),
        }
    }
}

impl Display for ModelTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ordered, de-duplicated list of model terms.
///
/// ```
/// use cdesign::Formula;
///
/// let formula = Formula::parse("x1 + x2 + x1:x2 + {x1**2}").unwrap();
/// assert_eq!(formula.names(), vec!["1", "x1", "x2", "x1**2", "x1:x2"]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    terms: Vec<ModelTerm>,
}

impl Display for Formula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.names().join(" + "))
    }
}

impl Formula {
    /// Creates a formula from terms, which are de-duplicated and sorted by order.
    pub fn new(terms: Vec<ModelTerm>) -> Self {
        let mut unique: Vec<ModelTerm> = vec![];
        for t in terms {
            if !unique.iter().any(|u| u.canonical() == t.canonical()) {
                unique.push(t);
            }
        }
        unique.sort_by_key(|t| t.order());
        Self { terms: unique }
    }

    /// Parses an explicit formula such as `x1 + x2 + x1:x2 + {x3**2}`.
    ///
    /// A leading `y ~` is ignored. The intercept is added unless `0` or `-1` is part of the
    /// formula, `a*b` expands to `a + b + a:b` and `- term` removes a term.
    pub fn parse(spec: &str) -> Result<Self> {
        let rhs = match spec.split_once('~') {
            Some((_, rhs)) => rhs,
            None => spec,
        };
        let unrecognized = |reason: &str| Error::UnrecognizedFormula {
            spec: spec.to_string(),
            reason: reason.to_string(),
        };

        let mut added: Vec<ModelTerm> = vec![];
        let mut removed: Vec<ModelTerm> = vec![];
        let mut intercept = true;
        for (negative, chunk) in split_top_level(rhs).map_err(|r| unrecognized(&r))? {
            let chunk = chunk.trim();
            if chunk.is_empty() {
                return Err(unrecognized("empty term"));
            }
            match chunk {
                "1" => intercept = !negative,
                "0" => intercept = false,
                _ => {
                    let terms = parse_chunk(chunk).map_err(|r| unrecognized(&r))?;
                    match negative {
                        true => removed.extend(terms),
                        false => added.extend(terms),
                    }
                }
            }
        }
        let mut terms = vec![];
        if intercept {
            terms.push(ModelTerm::Intercept);
        }
        terms.extend(
            added
                .into_iter()
                .filter(|t| !removed.iter().any(|r| r.canonical() == t.canonical())),
        );
        Ok(Self::new(terms))
    }

    /// Terms in column order of the model matrix.
    pub fn terms(&self) -> &[ModelTerm] {
        &self.terms
    }

    /// Number of terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True without terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Term names in column order.
    pub fn names(&self) -> Vec<String> {
        self.terms.iter().map(|t| t.name()).collect()
    }

    /// All variables referenced by any term, in order of first appearance.
    pub fn variables(&self) -> Vec<String> {
        let mut vars: Vec<String> = vec![];
        for t in &self.terms {
            for v in t.variables() {
                if !vars.contains(v) {
                    vars.push(v.clone());
                }
            }
        }
        vars
    }
}

/// Splits at `+` and `-` outside of braces and parentheses, returning `(negative, chunk)`.
fn split_top_level(s: &str) -> std::result::Result<Vec<(bool, &str)>, String> {
    let mut out = vec![];
    let mut depth: i32 = 0;
    let mut start = 0;
    let mut negative = false;
    let bytes = s.as_bytes();
    for (i, c) in s.char_indices() {
        match c {
            '{' | '(' => depth += 1,
            '}' | ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(format!("unbalanced `{c}` at position {i}"));
                }
            }
            '+' | '-' if depth == 0 => {
                let chunk = &s[start..i];
                if !chunk.trim().is_empty() {
                    out.push((negative, chunk));
                } else if i > 0 && !bytes[..i].iter().all(|b| b.is_ascii_whitespace()) {
                    return Err(format!("missing term before `{c}` at position {i}"));
                }
                negative = c == '-';
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err("unbalanced braces".to_string());
    }
    out.push((negative, &s[start..]));
    Ok(out)
}

fn is_key(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

fn parse_chunk(chunk: &str) -> std::result::Result<Vec<ModelTerm>, String> {
    if chunk.starts_with('{') {
        if !chunk.ends_with('}') {
            return Err(format!("trailing input after braced term `{chunk}`"));
        }
        let inner = &chunk[1..chunk.len() - 1];
        return ModelTerm::transform(inner)
            .map(|t| vec![t])
            .map_err(|e| e.to_string());
    }
    // crossing: all non-empty subsets of the crossed factors
    let crossed: Vec<Vec<String>> = chunk
        .split('*')
        .map(|part| {
            part.split(':')
                .map(|f| {
                    let f = f.trim();
                    match is_key(f) {
                        true => Ok(f.to_string()),
                        false => Err(format!("`{f}` is not a variable key")),
                    }
                })
                .collect::<std::result::Result<Vec<_>, String>>()
        })
        .collect::<std::result::Result<_, _>>()?;
    let n = crossed.len();
    let mut terms = vec![];
    for mask in 1..(1usize << n) {
        let mut factors: Vec<String> = vec![];
        for (i, part) in crossed.iter().enumerate() {
            if mask & (1 << i) != 0 {
                for f in part {
                    if !factors.contains(f) {
                        factors.push(f.clone());
                    }
                }
            }
        }
        terms.push(ModelTerm::Interaction(factors));
    }
    Ok(terms)
}

/// Expands a keyword or parses an explicit formula, checking every variable against the design
/// columns of `domain`.
///
/// Keywords (`-` and `_` are interchangeable): `linear`, `linear-and-quadratic`,
/// `linear-and-interactions` and `fully-quadratic`.
pub fn build_formula(spec: &str, domain: &Domain) -> Result<Formula> {
    let keys = domain.design_columns();
    let main_effects = || keys.iter().map(|k| ModelTerm::main_effect(k));
    let squares = || {
        keys.iter()
            .map(|k| ModelTerm::transform(&format!("{k}**2")))
            .collect::<Result<Vec<_>>>()
    };
    let interactions = || {
        let mut terms = vec![];
        for i in 0..keys.len() {
            for j in 0..i {
                terms.push(ModelTerm::Interaction(vec![
                    keys[j].clone(),
                    keys[i].clone(),
                ]));
            }
        }
        terms
    };

    let mut terms = vec![ModelTerm::Intercept];
    match spec.trim().replace('_', "-").as_str() {
        "linear" => terms.extend(main_effects()),
        "linear-and-quadratic" => {
            terms.extend(main_effects());
            terms.extend(squares()?);
        }
        "linear-and-interactions" => {
            terms.extend(main_effects());
            terms.extend(interactions());
        }
        "fully-quadratic" => {
            terms.extend(main_effects());
            terms.extend(interactions());
            terms.extend(squares()?);
        }
        _ => {
            let formula = Formula::parse(spec)?;
            let keyword_like = spec
                .trim()
                .chars()
                .all(|c| c.is_alphanumeric() || c == '-' || c == '_');
            for v in formula.variables() {
                if !keys.contains(&v) && keyword_like {
                    return Err(Error::UnrecognizedFormula {
                        spec: spec.to_string(),
                        reason: "neither a known keyword nor a formula over the domain inputs"
                            .to_string(),
                    });
                }
                if !keys.contains(&v) {
                    return Err(Error::UnknownKey {
                        key: v,
                        context: format!("model formula `{spec}`"),
                    });
                }
            }
            return Ok(formula);
        }
    }
    Ok(Formula::new(terms))
}
