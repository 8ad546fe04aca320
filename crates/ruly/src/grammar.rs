use std::fmt;
use std::ops::{Add, BitOr};
use std::sync::Arc;

use cranelift_entity::{entity_impl, PrimaryMap};

use crate::charclass::CharClass;
use crate::parser::Capture;
use crate::status::Status;

/// Saturating repetition bound. A cycle whose `max` reaches this value
/// reports [`Status::OVER`] when it runs all the way to the bound.
pub const MAX_ITERATIONS: u32 = 0x4096;

/// Host predicate invoked on the text of the last matched span.
pub type ActionFn = fn(&str) -> bool;

/// Callback bound to a rule. Receives the parsed input and the captures of
/// the rule's body in source order, returns the folded payload that the
/// engine wraps into the capture appended to the parent frame.
pub type Fold<T> = fn(&str, &[Capture<T>]) -> T;

/// Identity fold, forwards the payload of the first child capture.
pub fn by_pass<T: Clone + Default>(_src: &str, kids: &[Capture<T>]) -> T {
    kids.first().map(|c| c.data.clone()).unwrap_or_default()
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct ProdHandle(u32);

entity_impl! { ProdHandle }

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProdKind {
    /// Whitespace-tight named production.
    Lexeme,
    /// Whitespace-loose named production, may carry a fold callback.
    Rule,
}

pub struct Production<T> {
    pub name: Arc<str>,
    pub kind: ProdKind,
    pub body: Option<Expr>,
    pub fold: Option<Fold<T>>,
}

/// Zero-width matchers contributing only a status flag.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Ctrl {
    /// Succeeds, consumes nothing.
    Empty,
    /// Succeeds and forces the enclosing alternation to commit.
    Commit,
    /// As an alternation member, switches it to first-match mode.
    AcceptFirst,
    /// Turns the following sequence element into a positive lookahead.
    Skip,
    /// Arms the enclosing sequence's catch hook.
    Attempt,
}

impl Ctrl {
    pub(crate) fn status(self) -> Status {
        match self {
            Ctrl::Empty => Status::OK | Status::NULL,
            Ctrl::Commit => Status::OK | Status::RET,
            Ctrl::AcceptFirst => Status::FIRST,
            Ctrl::Skip => Status::OK | Status::SKIP,
            Ctrl::Attempt => Status::OK | Status::TRY,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Ctrl::Empty => "empty",
            Ctrl::Commit => "commit",
            Ctrl::AcceptFirst => "accept-first",
            Ctrl::Skip => "skip",
            Ctrl::Attempt => "attempt",
        }
    }
}

/// A grammar expression. Built with the `+` and `|` operators plus the
/// repetition and control constructors, then installed as the body of a
/// named production with [`Grammar::define`].
#[derive(Clone)]
pub enum Expr {
    Class(CharClass),
    Literal {
        bytes: Arc<[u8]>,
        ci: bool,
        name: Arc<str>,
    },
    Seq(Vec<Expr>),
    Alt(Vec<Expr>),
    Cycle {
        min: u32,
        max: u32,
        over: bool,
        body: Box<Expr>,
    },
    Ctrl(Ctrl),
    Action {
        f: ActionFn,
        name: Arc<str>,
    },
    Prod(ProdHandle),
}

impl Expr {
    /// Byte-exact literal. Matches whitespace-tight and reports a single
    /// span named after the literal text.
    pub fn literal(text: &str) -> Expr {
        Expr::Literal {
            bytes: text.as_bytes().into(),
            ci: false,
            name: text.into(),
        }
    }

    /// ASCII case-insensitive literal.
    pub fn literal_ci(text: &str) -> Expr {
        Expr::Literal {
            bytes: text.as_bytes().into(),
            ci: true,
            name: text.into(),
        }
    }

    pub fn display_into<T>(&self, buf: &mut dyn fmt::Write, cx: &Grammar<T>) -> fmt::Result {
        match self {
            Expr::Class(class) => write!(buf, "[{}]", class.name()),
            Expr::Literal { name, ci, .. } => {
                write!(buf, "'{name}'")?;
                if *ci {
                    buf.write_str("i")?;
                }
                Ok(())
            }
            Expr::Seq(children) => display_group(buf, cx, children, " + "),
            Expr::Alt(children) => display_group(buf, cx, children, " | "),
            Expr::Cycle {
                min, max, over, body, ..
            } => {
                if *over {
                    write!(buf, "{min}*(")?;
                } else {
                    write!(buf, "{min}*{max}(")?;
                }
                body.display_into(buf, cx)?;
                buf.write_str(")")
            }
            Expr::Ctrl(ctrl) => write!(buf, "${}", ctrl.name()),
            Expr::Action { name, .. } => write!(buf, "@{name}"),
            Expr::Prod(handle) => write!(buf, "<{}>", cx.name(*handle)),
        }
    }
}

fn display_group<T>(
    buf: &mut dyn fmt::Write,
    cx: &Grammar<T>,
    children: &[Expr],
    sep: &str,
) -> fmt::Result {
    buf.write_str("(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            buf.write_str(sep)?;
        }
        child.display_into(buf, cx)?;
    }
    buf.write_str(")")
}

/// Bounded repetition of `element`, between `min` and `max` matches.
pub fn cycle(min: u32, max: u32, element: impl Into<Expr>) -> Expr {
    debug_assert!(min <= max, "repetition bounds are inverted");
    Expr::Cycle {
        min,
        max,
        over: max >= MAX_ITERATIONS,
        body: Box::new(element.into()),
    }
}

pub fn zero_or_more(element: impl Into<Expr>) -> Expr {
    cycle(0, MAX_ITERATIONS, element)
}

pub fn one_or_more(element: impl Into<Expr>) -> Expr {
    cycle(1, MAX_ITERATIONS, element)
}

pub fn opt(element: impl Into<Expr>) -> Expr {
    cycle(0, 1, element)
}

pub fn empty() -> Expr {
    Expr::Ctrl(Ctrl::Empty)
}

pub fn commit() -> Expr {
    Expr::Ctrl(Ctrl::Commit)
}

pub fn accept_first() -> Expr {
    Expr::Ctrl(Ctrl::AcceptFirst)
}

pub fn skip() -> Expr {
    Expr::Ctrl(Ctrl::Skip)
}

pub fn attempt() -> Expr {
    Expr::Ctrl(Ctrl::Attempt)
}

pub fn action(f: ActionFn, name: &str) -> Expr {
    Expr::Action {
        f,
        name: name.into(),
    }
}

impl From<CharClass> for Expr {
    fn from(class: CharClass) -> Expr {
        Expr::Class(class)
    }
}

impl From<&CharClass> for Expr {
    fn from(class: &CharClass) -> Expr {
        Expr::Class(class.clone())
    }
}

impl From<&str> for Expr {
    fn from(text: &str) -> Expr {
        Expr::literal(text)
    }
}

impl From<char> for Expr {
    fn from(c: char) -> Expr {
        debug_assert!(c.is_ascii(), "terminals match single bytes");
        Expr::Class(CharClass::byte(c as u8))
    }
}

impl From<ProdHandle> for Expr {
    fn from(handle: ProdHandle) -> Expr {
        Expr::Prod(handle)
    }
}

impl<R: Into<Expr>> Add<R> for Expr {
    type Output = Expr;
    fn add(self, rhs: R) -> Expr {
        match self {
            Expr::Seq(mut children) => {
                children.push(rhs.into());
                Expr::Seq(children)
            }
            first => Expr::Seq(vec![first, rhs.into()]),
        }
    }
}

impl<R: Into<Expr>> BitOr<R> for Expr {
    type Output = Expr;
    fn bitor(self, rhs: R) -> Expr {
        match self {
            Expr::Alt(mut children) => {
                children.push(rhs.into());
                Expr::Alt(children)
            }
            first => Expr::Alt(vec![first, rhs.into()]),
        }
    }
}

impl<R: Into<Expr>> Add<R> for CharClass {
    type Output = Expr;
    fn add(self, rhs: R) -> Expr {
        Expr::from(self) + rhs
    }
}

impl<R: Into<Expr>> BitOr<R> for CharClass {
    type Output = Expr;
    fn bitor(self, rhs: R) -> Expr {
        Expr::from(self) | rhs
    }
}

impl<R: Into<Expr>> Add<R> for ProdHandle {
    type Output = Expr;
    fn add(self, rhs: R) -> Expr {
        Expr::from(self) + rhs
    }
}

impl<R: Into<Expr>> BitOr<R> for ProdHandle {
    type Output = Expr;
    fn bitor(self, rhs: R) -> Expr {
        Expr::from(self) | rhs
    }
}

impl Add<Expr> for &str {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::from(self) + rhs
    }
}

impl Add<CharClass> for &str {
    type Output = Expr;
    fn add(self, rhs: CharClass) -> Expr {
        Expr::from(self) + rhs
    }
}

impl Add<ProdHandle> for &str {
    type Output = Expr;
    fn add(self, rhs: ProdHandle) -> Expr {
        Expr::from(self) + rhs
    }
}

impl BitOr<Expr> for &str {
    type Output = Expr;
    fn bitor(self, rhs: Expr) -> Expr {
        Expr::from(self) | rhs
    }
}

impl BitOr<CharClass> for &str {
    type Output = Expr;
    fn bitor(self, rhs: CharClass) -> Expr {
        Expr::from(self) | rhs
    }
}

impl BitOr<ProdHandle> for &str {
    type Output = Expr;
    fn bitor(self, rhs: ProdHandle) -> Expr {
        Expr::from(self) | rhs
    }
}

/// Arena of named productions. The grammar is built once, parsed against any
/// number of inputs, and torn down by `Drop`; recursion between productions
/// goes through [`ProdHandle`] so definition order does not matter.
pub struct Grammar<T = ()> {
    prods: PrimaryMap<ProdHandle, Production<T>>,
}

impl<T> Grammar<T> {
    pub fn new() -> Grammar<T> {
        Grammar {
            prods: PrimaryMap::new(),
        }
    }

    /// Declares a whitespace-tight production. The body comes later through
    /// [`Grammar::define`].
    pub fn lexeme(&mut self, name: &str) -> ProdHandle {
        self.declare(name, ProdKind::Lexeme)
    }

    /// Declares a whitespace-loose production.
    pub fn rule(&mut self, name: &str) -> ProdHandle {
        self.declare(name, ProdKind::Rule)
    }

    fn declare(&mut self, name: &str, kind: ProdKind) -> ProdHandle {
        self.prods.push(Production {
            name: name.into(),
            kind,
            body: None,
            fold: None,
        })
    }

    /// Installs or replaces the body of a production.
    pub fn define(&mut self, handle: ProdHandle, body: impl Into<Expr>) {
        self.prods[handle].body = Some(body.into());
    }

    /// Associates a fold callback with a rule.
    pub fn bind(&mut self, handle: ProdHandle, fold: Fold<T>) {
        debug_assert!(
            self.prods[handle].kind == ProdKind::Rule,
            "callbacks bind to rules"
        );
        self.prods[handle].fold = Some(fold);
    }

    pub fn name(&self, handle: ProdHandle) -> &str {
        &self.prods[handle].name
    }

    pub(crate) fn get(&self, handle: ProdHandle) -> &Production<T> {
        &self.prods[handle]
    }

    pub fn display_into(&self, buf: &mut dyn fmt::Write) -> fmt::Result {
        for (_, prod) in self.prods.iter() {
            write!(buf, "{} = ", prod.name)?;
            match &prod.body {
                Some(body) => body.display_into(buf, self)?,
                None => buf.write_str("?")?,
            }
            buf.write_str("\n")?;
        }
        Ok(())
    }
}

impl<T> Default for Grammar<T> {
    fn default() -> Self {
        Grammar::new()
    }
}

impl<T> fmt::Display for Grammar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.display_into(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_append_to_groups() {
        let seq = Expr::literal("a") + "b" + "c";
        match seq {
            Expr::Seq(children) => assert_eq!(children.len(), 3),
            _ => panic!("expected a sequence"),
        }

        let alt = Expr::literal("a") | "b" | "c";
        match alt {
            Expr::Alt(children) => assert_eq!(children.len(), 3),
            _ => panic!("expected an alternation"),
        }
    }

    #[test]
    fn grouping_is_preserved_on_the_right() {
        let nested = Expr::literal("a") + (Expr::literal("b") | "c");
        match nested {
            Expr::Seq(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[1], Expr::Alt(_)));
            }
            _ => panic!("expected a sequence"),
        }
    }

    #[test]
    fn saturated_cycles_are_flagged() {
        match zero_or_more(CharClass::byte(b'x')) {
            Expr::Cycle { min, max, over, .. } => {
                assert_eq!(min, 0);
                assert_eq!(max, MAX_ITERATIONS);
                assert!(over);
            }
            _ => panic!("expected a cycle"),
        }
        match cycle(2, 3, CharClass::byte(b'x')) {
            Expr::Cycle { over, .. } => assert!(!over),
            _ => panic!("expected a cycle"),
        }
    }

    #[test]
    fn display_shows_definitions() {
        let mut g: Grammar = Grammar::new();
        let digit = CharClass::range(b'0', b'9').named("digit");
        let number = g.rule("number");
        g.define(number, one_or_more(digit));
        g.lexeme("pending");

        let text = g.to_string();
        assert_eq!(text, "number = 1*([digit])\npending = ?\n");
    }
}
