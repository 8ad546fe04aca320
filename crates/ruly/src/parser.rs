use std::sync::Arc;

use crate::charclass::CharClass;
use crate::grammar::{ActionFn, Expr, Grammar, ProdHandle, ProdKind, Production};
use crate::span::Span;
use crate::status::Status;

/// One parse result record. Rules with a fold callback produce captures with
/// a folded payload; plain lexemes and terminals produce stub captures with
/// `T::default()`.
#[derive(Clone, Debug)]
pub struct Capture<T> {
    pub data: T,
    pub span: Span,
    pub name: Arc<str>,
}

impl<T> Capture<T> {
    pub fn text<'s>(&self, src: &'s str) -> &'s str {
        self.span.as_str(src)
    }
}

/// Advances past ignorable bytes before a whitespace-loose match.
pub type SkipFn = fn(src: &str, pos: usize) -> usize;

/// Invoked when a `Try`-armed sequence element fails. Returning a status
/// containing [`Status::OK`] upgrades the failure; the returned position
/// becomes the new cursor, which lets hosts resynchronize past bad input.
pub type CatchFn = fn(src: &str, pos: usize) -> (Status, usize);

/// Skips ASCII space, tab, newline and carriage return.
pub fn skip_whitespace(src: &str, mut pos: usize) -> usize {
    let bytes = src.as_bytes();
    while let Some(&b) = bytes.get(pos) {
        if b != b' ' && b != b'\t' && b != b'\n' && b != b'\r' {
            break;
        }
        pos += 1;
    }
    pos
}

fn no_recovery(_src: &str, pos: usize) -> (Status, usize) {
    (Status::NONE, pos)
}

/// Per-parse hook table. A custom `skip` replaces the default whitespace
/// skipper outright, so a host that keeps whitespace significant can still
/// skip comment lines.
#[derive(Clone, Copy)]
pub struct Hooks {
    pub skip: SkipFn,
    pub catch: CatchFn,
}

impl Default for Hooks {
    fn default() -> Hooks {
        Hooks {
            skip: skip_whitespace,
            catch: no_recovery,
        }
    }
}

#[derive(Clone, Copy)]
struct SavePoint {
    pos: u32,
    marks: u32,
    caps: u32,
    last: Span,
}

/// Mutable per-invocation parse state: the input cursor, the span-boundary
/// stack, the optional capture frames and the lexeme/rule scope depth.
/// Lives exactly one analyze call.
pub struct Parser<'s, T> {
    src: &'s str,
    pos: u32,
    marks: Vec<u32>,
    frames: Vec<Option<Vec<Capture<T>>>>,
    level: u32,
    last: Span,
    hooks: Hooks,
    stop: u32,
}

impl<'s, T> Parser<'s, T> {
    pub fn new(src: &'s str) -> Parser<'s, T> {
        Parser {
            src,
            pos: 0,
            marks: Vec::new(),
            frames: Vec::new(),
            level: 1,
            last: Span::empty(),
            hooks: Hooks::default(),
            stop: 0,
        }
    }

    pub fn set_hooks(&mut self, hooks: Hooks) {
        self.hooks = hooks;
    }

    /// Turns on capture collection. Without it the engine never touches the
    /// result stack and fold callbacks are not invoked.
    pub fn track_results(&mut self) {
        if self.frames.is_empty() {
            self.frames.push(Some(Vec::new()));
        }
    }

    /// First unparsed position, valid after the parse returned.
    pub fn stop(&self) -> usize {
        self.stop as usize
    }

    /// Takes the top-level capture out of the root frame.
    pub fn take_result(&mut self) -> Option<Capture<T>> {
        let frame = self.frames.first_mut()?.as_mut()?;
        if frame.is_empty() {
            return None;
        }
        Some(frame.remove(0))
    }

    fn save(&self) -> SavePoint {
        SavePoint {
            pos: self.pos,
            marks: self.marks.len() as u32,
            caps: self.frame_len(),
            last: self.last,
        }
    }

    fn frame_len(&self) -> u32 {
        match self.frames.last() {
            Some(Some(frame)) => frame.len() as u32,
            _ => 0,
        }
    }

    fn restore(&mut self, at: SavePoint) {
        self.pos = at.pos;
        self.marks.truncate(at.marks as usize);
        if let Some(Some(frame)) = self.frames.last_mut() {
            frame.truncate(at.caps as usize);
        }
        self.last = at.last;
    }

    /// Drops the span and capture entries between two save points while
    /// keeping everything recorded after the second one. Used by the
    /// alternation to replace a previously best branch.
    fn discard_between(&mut self, low: SavePoint, high: SavePoint) {
        self.marks.drain(low.marks as usize..high.marks as usize);
        if let Some(Some(frame)) = self.frames.last_mut() {
            frame.drain(low.caps as usize..high.caps as usize);
        }
    }

    fn skip(&self, from: u32) -> u32 {
        (self.hooks.skip)(self.src, from as usize) as u32
    }

    fn at_end(&self) -> bool {
        self.pos as usize == self.src.len()
    }
}

impl<'s, T: Default> Parser<'s, T> {
    fn emit(&mut self, span: Span, name: &Arc<str>) {
        if let Some(Some(frame)) = self.frames.last_mut() {
            frame.push(Capture {
                data: T::default(),
                span,
                name: Arc::clone(name),
            });
        }
    }

    fn commit_span(&mut self, span: Span, name: &Arc<str>) {
        self.emit(span, name);
        self.marks.push(span.start());
        self.marks.push(span.end());
        self.last = span;
    }

    fn parse(&mut self, cx: &Grammar<T>, expr: &Expr) -> Status {
        match expr {
            Expr::Class(class) => self.match_class(class),
            Expr::Literal { bytes, ci, name } => self.match_literal(bytes, *ci, name),
            Expr::Seq(children) => self.match_seq(cx, children),
            Expr::Alt(children) => self.match_alt(cx, children),
            Expr::Cycle {
                min,
                max,
                over,
                body,
            } => self.match_cycle(cx, *min, *max, *over, body),
            Expr::Ctrl(ctrl) => ctrl.status(),
            Expr::Action { f, .. } => self.match_action(*f),
            Expr::Prod(handle) => self.match_prod(cx, *handle),
        }
    }

    fn match_class(&mut self, class: &CharClass) -> Status {
        let mut at = self.pos;
        if self.level > 0 {
            at = self.skip(at);
        }
        match self.src.as_bytes().get(at as usize) {
            Some(&b) if class.contains(b) => {
                let span = Span::new(at, at + 1);
                if self.level > 0 {
                    self.commit_span(span, class.name());
                } else {
                    self.last = span;
                }
                self.pos = span.end();
                if self.at_end() {
                    Status::OK | Status::EOF
                } else {
                    Status::OK
                }
            }
            _ => Status::NONE,
        }
    }

    fn match_literal(&mut self, bytes: &[u8], ci: bool, name: &Arc<str>) -> Status {
        if bytes.is_empty() {
            return Status::ERROR | Status::BAD_LEXEME;
        }
        let mut at = self.pos;
        if self.level > 0 {
            at = self.skip(at);
        }
        let src = self.src.as_bytes();
        for (i, &b) in bytes.iter().enumerate() {
            match src.get(at as usize + i) {
                Some(&s) if s == b || (ci && s.eq_ignore_ascii_case(&b)) => {}
                // input ran out in the middle of the literal
                None if i > 0 => return Status::ERROR | Status::EOF,
                _ => return Status::NONE,
            }
        }
        let span = Span::new(at, at + bytes.len() as u32);
        if self.level > 0 {
            self.commit_span(span, name);
        } else {
            self.last = span;
        }
        self.pos = span.end();
        if self.at_end() {
            Status::OK | Status::EOF
        } else {
            Status::OK
        }
    }

    fn match_action(&mut self, f: ActionFn) -> Status {
        if f(self.last.as_str(self.src)) {
            Status::OK
        } else {
            Status::NONE
        }
    }

    fn match_seq(&mut self, cx: &Grammar<T>, children: &[Expr]) -> Status {
        let entry = self.save();
        let mut acc = Status::NONE;
        let mut lookahead: Option<SavePoint> = None;

        for child in children {
            let stat = self.parse(cx, child);
            acc |= stat;
            if stat.contains(Status::OK) && !stat.contains(Status::ERROR) {
                if let Some(at) = lookahead.take() {
                    self.restore(at);
                }
                if stat.contains(Status::SKIP) {
                    lookahead = Some(self.save());
                }
                if stat.contains(Status::RET) {
                    return Status::OK | Status::RET | (acc & !(Status::TRY | Status::SKIP | Status::OK));
                }
                acc &= !(Status::OK | Status::SKIP | Status::RET);
                continue;
            }

            if self.level > 0
                && acc.contains(Status::TRY)
                && !stat.contains(Status::ERROR)
                && lookahead.is_none()
            {
                let (caught, at) = (self.hooks.catch)(self.src, self.pos as usize);
                if caught.contains(Status::OK) {
                    self.pos = at as u32;
                    acc |= (caught | Status::CATCH) & !(Status::OK | Status::SKIP | Status::RET);
                    continue;
                }
                acc |= caught;
            }

            self.restore(entry);
            let promoted = if acc.intersects(Status::EOF | Status::OVER) {
                Status::ERROR
            } else {
                Status::NONE
            };
            return promoted | (acc & !(Status::TRY | Status::SKIP | Status::OK));
        }

        let forced = if acc.contains(Status::TRY) {
            Status::RET
        } else {
            Status::NONE
        };
        forced | Status::OK | (acc & !(Status::TRY | Status::SKIP))
    }

    fn match_alt(&mut self, cx: &Grammar<T>, children: &[Expr]) -> Status {
        let entry = self.save();
        let mut acc = Status::NONE;
        let mut best = Status::NONE;
        let mut best_len: u32 = 0;
        let mut matched = false;

        for child in children {
            let branch = self.save();
            self.pos = entry.pos;
            let stat = self.parse(cx, child);
            acc |= stat;

            if stat.contains(Status::ERROR) {
                return acc & !(Status::OK | Status::RET | Status::FIRST);
            }

            if stat.contains(Status::OK) {
                matched = true;
                let len = self.pos - entry.pos;
                if len > best_len || (len > 0 && acc.intersects(Status::RET | Status::FIRST)) {
                    self.discard_between(entry, branch);
                    best_len = len;
                    best = stat;
                    if acc.intersects(Status::RET | Status::FIRST) {
                        break;
                    }
                    acc &= !(Status::OK | Status::RET);
                    continue;
                }
            }

            self.restore(branch);
            acc &= !(Status::OK | Status::RET);
        }

        let leak = acc & !(Status::OK | Status::RET | Status::FIRST | Status::ERROR);
        if best_len > 0 || matched {
            (best | leak | Status::OK) & !(Status::FIRST | Status::RET)
        } else {
            leak
        }
    }

    fn match_cycle(
        &mut self,
        cx: &Grammar<T>,
        min: u32,
        max: u32,
        over: bool,
        body: &Expr,
    ) -> Status {
        let entry = self.save();
        let mut acc = Status::NONE;
        let mut i = 0;
        while i < max {
            let stat = self.parse(cx, body);
            acc |= stat;
            if stat.contains(Status::OK) && !stat.contains(Status::ERROR) {
                acc &= !(Status::OK | Status::FIRST | Status::TRY | Status::SKIP | Status::RET);
                i += 1;
                continue;
            }
            if i < min {
                self.restore(entry);
                return acc & !Status::OK;
            }
            return acc | Status::OK;
        }
        let saturated = if over { Status::OVER } else { Status::NONE };
        acc | saturated | Status::OK
    }

    fn match_prod(&mut self, cx: &Grammar<T>, handle: ProdHandle) -> Status {
        let prod = cx.get(handle);
        match prod.kind {
            ProdKind::Rule => self.match_rule(cx, prod),
            ProdKind::Lexeme => self.match_lexeme(cx, prod),
        }
    }

    fn match_rule(&mut self, cx: &Grammar<T>, prod: &Production<T>) -> Status {
        let body = match &prod.body {
            Some(body) => body,
            None => return Status::ERROR | Status::BAD_RULE,
        };
        if self.level == 0 {
            // rules assume loose scope and cannot run inside a lexeme
            return Status::ERROR | Status::BAD_RULE;
        }

        let entry = self.save();
        let tracking = !self.frames.is_empty();
        if tracking {
            let collecting = prod.fold.is_some();
            self.frames
                .push(if collecting { Some(Vec::new()) } else { None });
        }

        log::trace!("rule {} at {}", prod.name, entry.pos);
        let stat = self.parse(cx, body);
        let kids = if tracking { self.frames.pop().flatten() } else { None };

        if stat.contains(Status::OK) && self.marks.len() as u32 > entry.marks {
            let begin = self.marks[entry.marks as usize];
            let end = self.marks[self.marks.len() - 1];
            let span = Span::new(begin, end);
            if tracking {
                if let Some(fold) = prod.fold {
                    let data = fold(self.src, kids.as_deref().unwrap_or(&[]));
                    if let Some(Some(parent)) = self.frames.last_mut() {
                        parent.push(Capture {
                            data,
                            span,
                            name: Arc::clone(&prod.name),
                        });
                    }
                } else {
                    self.emit(span, &prod.name);
                }
            }
            self.marks.truncate(entry.marks as usize);
            self.marks.push(span.start());
            self.marks.push(span.end());
            self.last = span;
        } else if !stat.contains(Status::OK) {
            self.restore(entry);
        }
        log::trace!("rule {} -> {stat}", prod.name);
        stat
    }

    fn match_lexeme(&mut self, cx: &Grammar<T>, prod: &Production<T>) -> Status {
        let body = match &prod.body {
            Some(body) => body,
            None => return Status::ERROR | Status::BAD_LEXEME,
        };
        if self.level == 0 {
            // a lexeme nested inside another lexeme is transparent
            return self.parse(cx, body);
        }

        let entry = self.save();
        let org = self.skip(self.pos);
        self.pos = org;
        self.level -= 1;
        let stat = self.parse(cx, body);
        self.level += 1;

        if stat.contains(Status::OK) && self.pos > org {
            self.commit_span(Span::new(org, self.pos), &prod.name);
        } else {
            self.restore(entry);
        }
        stat
    }

    fn check_tail(&mut self) -> Status {
        let at = self.skip(self.pos);
        self.stop = at;
        if (at as usize) < self.src.len() {
            Status::ERROR | Status::REST
        } else {
            Status::NONE
        }
    }
}

impl<T: Default> Grammar<T> {
    /// Parses `input` against `root` and reports the status word plus the
    /// first unparsed byte offset. Fold callbacks are not invoked.
    pub fn analyze(&self, root: impl Into<Expr>, input: &str) -> (Status, usize) {
        let mut cx = Parser::new(input);
        let status = self.analyze_in(root, &mut cx);
        (status, cx.stop())
    }

    /// Like [`Grammar::analyze`] but collects captures and returns the folded
    /// top-level result.
    pub fn analyze_result(
        &self,
        root: impl Into<Expr>,
        input: &str,
    ) -> (Status, usize, Option<Capture<T>>) {
        let mut cx = Parser::new(input);
        cx.track_results();
        let status = self.analyze_in(root, &mut cx);
        (status, cx.stop(), cx.take_result())
    }

    /// Drives the root against a host-configured context, which supplies
    /// custom skip and catch hooks and optionally collects results.
    pub fn analyze_in(&self, root: impl Into<Expr>, cx: &mut Parser<'_, T>) -> Status {
        let root = root.into();
        let mut status = cx.parse(self, &root);
        status |= cx.check_tail();
        log::debug!("analyze -> {status} (stop {})", cx.stop);
        status
    }
}
