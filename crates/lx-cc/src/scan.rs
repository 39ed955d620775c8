//! Lexical include/import scanner.
//!
//! Extracts the `#include`, `import`, and `module` declarations from a
//! single source file without running a preprocessor. The scan is
//! byte-granular and deliberately conservative: conditional code is always
//! scanned, so the graph may carry spurious edges (extra rebuilds, never
//! incorrectness), and directives only reachable through macros in the
//! same file are invisible (compensated by recursively scanning every
//! discovered header).

use std::io;

use camino::Utf8Path;
use thiserror::Error;

/// Upper bound on a single include path or module name.
pub const MAX_PATH_LEN: usize = 4096;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("failed to open source file: {0}")]
    OpenFailed(#[from] io::Error),

    #[error("unexpected end of file inside a directive")]
    UnexpectedEnd,

    #[error("a path or module name exceeds {MAX_PATH_LEN} bytes")]
    BufferTooSmall,
}

/// How an include was written, which decides local vs. system resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncludeStyle {
    /// `#include "x"`
    Quoted,
    /// `#include <x>`
    Angled,
}

/// One `#include` directive, quotes stripped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Include {
    pub path: String,
    pub style: IncludeStyle,
}

/// Everything a single scan produces.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub includes: Vec<Include>,
    /// Raw `import X;` names, `<>`/`""` kept as written.
    pub imports: Vec<String>,
    /// The `module X;` declaration, if any.
    pub module_name: Option<String>,
}

/// Scan a file on disk. Missing or unreadable files surface as
/// [`ScanError::OpenFailed`]; whether that is fatal depends on the kind of
/// the record being scanned.
pub fn scan_file(path: &Utf8Path) -> Result<ScanOutcome, ScanError> {
    let bytes = std::fs::read(path)?;
    scan_bytes(&bytes)
}

enum Directive {
    Include,
    Import,
    Module,
}

enum Comment {
    Line,
    Block,
}

struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    out: ScanOutcome,
}

/// Scan in-memory contents.
pub fn scan_bytes(bytes: &[u8]) -> Result<ScanOutcome, ScanError> {
    Scanner {
        bytes,
        pos: 0,
        out: ScanOutcome::default(),
    }
    .run()
}

impl Scanner<'_> {
    fn next(&mut self) -> Option<u8> {
        let b = self.bytes.get(self.pos).copied();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn run(mut self) -> Result<ScanOutcome, ScanError> {
        // Empty-space state: the start of the input, and the position after
        // every newline, `;`, or completed directive.
        'empty: loop {
            let Some(b) = self.next() else {
                return Ok(self.out);
            };
            match b {
                b'/' => {
                    if self.skip_comment().is_none() {
                        // A stray slash starts an ordinary token.
                        self.skip_token();
                    }
                }
                b' ' | b'\t' | b'\r' | b'\n' | b';' => {}
                b'#' => {
                    if self.match_directive(b"include") {
                        self.read_value(Directive::Include)?;
                    } else {
                        self.skip_token();
                    }
                }
                b'i' => {
                    if self.match_directive(b"mport") {
                        self.read_value(Directive::Import)?;
                    } else {
                        self.skip_token();
                    }
                }
                b'm' => {
                    if self.match_directive(b"odule") {
                        self.read_value(Directive::Module)?;
                    } else {
                        self.skip_token();
                    }
                }
                b'e' => {
                    // `export module X;` / `export import X;`: skip the
                    // keyword and fall back into this state.
                    if self.match_keyword(b"xport") {
                        continue 'empty;
                    }
                    self.skip_token();
                }
                _ => self.skip_token(),
            }
        }
    }

    /// Token state: absorb arbitrary code until a newline or `;`, skipping
    /// comments. This is what cheaply discards lines that merely contain
    /// the directive words.
    fn skip_token(&mut self) {
        loop {
            match self.next() {
                None | Some(b'\n') | Some(b';') => return,
                Some(b'/') => {
                    if let Some(Comment::Line) = self.skip_comment() {
                        return;
                    }
                }
                Some(_) => {}
            }
        }
    }

    /// After the lead byte of a directive matched, require the rest of the
    /// word followed by whitespace, `<`, or `"`. On mismatch the cursor is
    /// left on the offending byte for the token state.
    fn match_directive(&mut self, rest: &[u8]) -> bool {
        for &expect in rest {
            if self.peek() == Some(expect) {
                self.pos += 1;
            } else {
                return false;
            }
        }
        matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r' | b'<' | b'"'))
    }

    /// Like [`Self::match_directive`] but only whitespace may follow.
    fn match_keyword(&mut self, rest: &[u8]) -> bool {
        for &expect in rest {
            if self.peek() == Some(expect) {
                self.pos += 1;
            } else {
                return false;
            }
        }
        matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r'))
    }

    /// Called after a `/` was consumed. Consumes the comment if there is
    /// one: line comments through the terminating newline, block comments
    /// through `*/`. A lone slash is left alone.
    fn skip_comment(&mut self) -> Option<Comment> {
        match self.peek() {
            Some(b'/') => {
                self.pos += 1;
                while let Some(b) = self.next() {
                    if b == b'\n' {
                        break;
                    }
                }
                Some(Comment::Line)
            }
            Some(b'*') => {
                self.pos += 1;
                let mut star = false;
                while let Some(b) = self.next() {
                    if star && b == b'/' {
                        break;
                    }
                    star = b == b'*';
                }
                Some(Comment::Block)
            }
            _ => None,
        }
    }

    /// Read-start state: skip whitespace, then accumulate the directive's
    /// value (quoted by `<>`/`""`, or bare) and dispatch it.
    fn read_value(&mut self, directive: Directive) -> Result<(), ScanError> {
        let first = loop {
            match self.next() {
                None => return Err(ScanError::UnexpectedEnd),
                Some(b' ' | b'\t' | b'\n' | b'\r') => {}
                Some(b'/') => {
                    if self.skip_comment().is_none() {
                        break b'/';
                    }
                }
                // `module;` and friends: nothing to record.
                Some(b';') => return Ok(()),
                Some(other) => break other,
            }
        };

        let mut buf = Vec::with_capacity(64);
        buf.push(first);
        match first {
            b'<' => self.read_quoted(&mut buf, b'>')?,
            b'"' => self.read_quoted(&mut buf, b'"')?,
            _ => self.read_bare(&mut buf)?,
        }

        match directive {
            Directive::Include => {
                if buf.len() > 2 {
                    let style = if buf[0] == b'<' {
                        IncludeStyle::Angled
                    } else {
                        IncludeStyle::Quoted
                    };
                    let path = String::from_utf8_lossy(&buf[1..buf.len() - 1]).into_owned();
                    self.out.includes.push(Include { path, style });
                }
            }
            Directive::Import => {
                self.out
                    .imports
                    .push(String::from_utf8_lossy(&buf).into_owned());
            }
            Directive::Module => {
                self.out.module_name = Some(String::from_utf8_lossy(&buf).into_owned());
            }
        }
        Ok(())
    }

    fn read_quoted(&mut self, buf: &mut Vec<u8>, end: u8) -> Result<(), ScanError> {
        loop {
            let b = self.next().ok_or(ScanError::UnexpectedEnd)?;
            push_limited(buf, b)?;
            if b == end {
                return Ok(());
            }
        }
    }

    fn read_bare(&mut self, buf: &mut Vec<u8>) -> Result<(), ScanError> {
        loop {
            match self.next() {
                None => return Err(ScanError::UnexpectedEnd),
                Some(b' ' | b'\t' | b'\n' | b'\r' | b';') => return Ok(()),
                Some(b'/') => {
                    self.skip_comment();
                    return Ok(());
                }
                Some(b) => push_limited(buf, b)?,
            }
        }
    }
}

fn push_limited(buf: &mut Vec<u8>, b: u8) -> Result<(), ScanError> {
    buf.push(b);
    if buf.len() >= MAX_PATH_LEN {
        return Err(ScanError::BufferTooSmall);
    }
    Ok(())
}
