use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

/// Packed status word returned by every matcher.
///
/// `OK` set with `ERROR` clear means the element matched. The remaining bits
/// carry override and diagnostic flags between matchers; see the constants
/// below for their meaning.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Status(u32);

impl Status {
    pub const NONE: Status = Status(0);
    /// The element matched.
    pub const OK: Status = Status(0x1);
    /// Force the enclosing alternation to commit to this branch.
    pub const RET: Status = Status(0x8);
    /// Switch the enclosing alternation from accept-best to accept-first.
    pub const FIRST: Status = Status(0x10);
    /// The next element of the enclosing sequence is checked but not consumed.
    pub const SKIP: Status = Status(0x20);
    /// A catch hook recovered a failure inside a sequence.
    pub const CATCH: Status = Status(0x40);
    /// Arm the enclosing sequence's catch hook.
    pub const TRY: Status = Status(0x80);
    /// The grammar accepted a prefix of the input but not all of it.
    pub const REST: Status = Status(0x100);
    /// A null matcher participated in the parse.
    pub const NULL: Status = Status(0x200);
    /// A repetition ran into its saturating bound.
    pub const OVER: Status = Status(0x400);
    /// The cursor reached the end of the input.
    pub const EOF: Status = Status(0x800);
    /// A rule without a body was invoked, or a rule was nested inside a lexeme.
    pub const BAD_RULE: Status = Status(0x1000);
    /// A lexeme without a body was invoked.
    pub const BAD_LEXEME: Status = Status(0x2000);
    /// Reserved for host catch hooks reporting a recovered syntax error.
    pub const SYNTAX: Status = Status(0x4000);
    /// The parse could not continue.
    pub const ERROR: Status = Status(1 << 31);

    pub fn bits(self) -> u32 {
        self.0
    }
    pub fn contains(self, other: Status) -> bool {
        self.0 & other.0 == other.0
    }
    pub fn intersects(self, other: Status) -> bool {
        self.0 & other.0 != 0
    }
    /// Matched and no fatal condition was hit.
    pub fn accepted(self) -> bool {
        self.contains(Status::OK) && !self.contains(Status::ERROR)
    }
    pub fn fatal(self) -> bool {
        self.contains(Status::ERROR)
    }
}

impl BitOr for Status {
    type Output = Status;
    fn bitor(self, rhs: Status) -> Status {
        Status(self.0 | rhs.0)
    }
}

impl BitOrAssign for Status {
    fn bitor_assign(&mut self, rhs: Status) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Status {
    type Output = Status;
    fn bitand(self, rhs: Status) -> Status {
        Status(self.0 & rhs.0)
    }
}

impl BitAndAssign for Status {
    fn bitand_assign(&mut self, rhs: Status) {
        self.0 &= rhs.0;
    }
}

impl Not for Status {
    type Output = Status;
    fn not(self) -> Status {
        Status(!self.0)
    }
}

const FLAG_NAMES: &[(Status, &str)] = &[
    (Status::OK, "ok"),
    (Status::RET, "ret"),
    (Status::FIRST, "first"),
    (Status::SKIP, "skip"),
    (Status::CATCH, "catch"),
    (Status::TRY, "try"),
    (Status::REST, "rest"),
    (Status::NULL, "null"),
    (Status::OVER, "over"),
    (Status::EOF, "eof"),
    (Status::BAD_RULE, "bad-rule"),
    (Status::BAD_LEXEME, "bad-lexeme"),
    (Status::SYNTAX, "syntax"),
    (Status::ERROR, "error"),
];

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("none");
        }
        let mut first = true;
        for &(flag, name) in FLAG_NAMES {
            if self.intersects(flag) {
                if !first {
                    f.write_str("|")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Status({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_operations() {
        let s = Status::OK | Status::EOF;
        assert!(s.contains(Status::OK));
        assert!(s.contains(Status::EOF));
        assert!(!s.contains(Status::OK | Status::REST));
        assert!(s.intersects(Status::OK | Status::REST));

        let cleared = s & !Status::OK;
        assert!(!cleared.contains(Status::OK));
        assert!(cleared.contains(Status::EOF));
    }

    #[test]
    fn accepted_requires_no_fatal_bit() {
        assert!((Status::OK | Status::EOF).accepted());
        assert!(!(Status::OK | Status::ERROR).accepted());
        assert!(!Status::NONE.accepted());
    }

    #[test]
    fn display_names() {
        assert_eq!(Status::NONE.to_string(), "none");
        assert_eq!((Status::OK | Status::EOF).to_string(), "ok|eof");
        assert_eq!(
            (Status::ERROR | Status::BAD_RULE).to_string(),
            "bad-rule|error"
        );
    }
}
