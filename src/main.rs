//! # makel
//!
//! A linter for makefiles that checks them against the line structure the
//! POSIX `make` specification defines. It does not evaluate macros, rules or
//! recipes; it only validates the *shape* and *encoding* of each line.
//!
//! ## Overview
//!
//! `makel` reads a makefile as raw bytes, rebuilds its lines, and reports every
//! place where the input leaves well-defined, unambiguous, portable behaviour.
//! Each report belongs to a named diagnostic class whose action (ignore,
//! inform, style, warn) can be configured, and each class carries a severity
//! that escalates the process exit status.
//!
//! ## Key Components
//!
//! - **Line Loader**: Frames the byte stream into physical lines, repairing NUL
//!   bytes and a missing final `<newline>`.
//! - **Encoding Validator**: Replaces invalid UTF-8 with U+FFFD in place.
//! - **Column-Width Analyzer**: Measures terminal columns and enforces the
//!   configured maximum line length.
//! - **Continuation Joiner**: Strips trailing `<backslash>` markers, picks the
//!   joiner character and flags confusing continuation patterns.
//! - **Line Classifier**: Sorts lines into empty, blank, comment, command and
//!   other lines.
//! - **Warning Registry**: Maps each diagnostic class to its action and tracks
//!   the highest severity reached.
//!
//! ## Algorithm Flow
//!
//! ```text
//! Source → Line Loader → per line: Encoding Validator, Column-Width Analyzer
//!                      → Continuation Joiner (whole file)
//!                      → per logical line: Line Classifier
//!              diagnostics → Warning Registry → exit status
//! ```
//!
//! ## Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | No warnings |
//! | 1 | Style issues |
//! | 2 | Confusing constructs |
//! | 3 | Warnings |
//! | 4 | Unspecified behaviour |
//! | 5 | Non-conforming constructs |
//! | 6 | Undefined behaviour |
//! | 7 | Critical problems |
//! | 8 | Error (I/O failure, no makefile found, invalid arguments) |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use anyhow::{Context, Result};
use clap::ValueEnum;
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use rich_rust::terminal;
use rich_rust::{ColorSystem, Console};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::{Duration, Instant};
use unicode_width::UnicodeWidthChar;

/// Program name used as the prefix of every diagnostic
const PROGRAM: &str = "makel";

// ─────────────────────────────────────────────────────────────────────────────
// Exit Codes
// ─────────────────────────────────────────────────────────────────────────────

/// Exit codes outside the severity scale
mod exit_codes {
    /// No non-informational diagnostic was emitted
    pub const SUCCESS: i32 = 0;
    /// `config path` found no config file
    pub const NO_CONFIG: i32 = 1;
    /// Fatal error: I/O failure, no makefile found, invalid arguments or config
    pub const ERROR: i32 = 8;
}

#[derive(Debug)]
struct ArgError(String);

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ArgError {}

#[derive(Debug)]
struct RunOutcome {
    severity: Option<Severity>,
}

impl RunOutcome {
    fn exit_code(&self) -> i32 {
        self.severity
            .map_or(exit_codes::SUCCESS, Severity::exit_code)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Severities, Actions and Diagnostic Classes
// ─────────────────────────────────────────────────────────────────────────────

/// How strongly a diagnostic affects the exit status, in increasing order.
///
/// The discriminant is the exit code the process returns when this is the
/// highest severity reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
enum Severity {
    /// Violates the configured style only
    Style = 1,
    /// Legal but easy to misread
    Confusing = 2,
    /// Questionable but well defined
    Warning = 3,
    /// POSIX leaves the behaviour unspecified
    Unspecified = 4,
    /// Not conforming to POSIX
    #[allow(dead_code)]
    Nonconforming = 5,
    /// POSIX leaves the behaviour undefined
    Undefined = 6,
    /// Reserved for problems that make the makefile unusable
    #[allow(dead_code)]
    Critical = 7,
}

impl Severity {
    fn exit_code(self) -> i32 {
        self as i32
    }

    fn name(self) -> &'static str {
        match self {
            Self::Style => "style",
            Self::Confusing => "confusing",
            Self::Warning => "warning",
            Self::Unspecified => "unspecified",
            Self::Nonconforming => "nonconforming",
            Self::Undefined => "undefined",
            Self::Critical => "critical",
        }
    }
}

/// What happens when a diagnostic of a class is emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    /// Drop the diagnostic entirely
    Ignore,
    /// Print it as information, without affecting the exit status
    Inform,
    /// Print it as a style warning
    #[value(name = "style")]
    #[serde(rename = "style")]
    WarnStyle,
    /// Print it as a warning
    Warn,
}

impl Action {
    fn name(self) -> &'static str {
        match self {
            Self::Ignore => "ignore",
            Self::Inform => "inform",
            Self::WarnStyle => "style",
            Self::Warn => "warn",
        }
    }
}

const WARNING_CLASS_COUNT: usize = 15;

/// A named, independently configurable category of diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
enum WarningClass {
    Makefile,
    ExtraMakefile,
    Cmdline,
    Text,
    Encoding,
    LongLine,
    NonemptyBlank,
    LeadingBadSpace,
    IllegalIndent,
    ContinuationOfBlank,
    ContinuationToBlank,
    EofLineContinuation,
    UnindentedContinuation,
    SpacelessContinuation,
    CommentContinuation,
}

impl WarningClass {
    const ALL: [WarningClass; WARNING_CLASS_COUNT] = [
        Self::Makefile,
        Self::ExtraMakefile,
        Self::Cmdline,
        Self::Text,
        Self::Encoding,
        Self::LongLine,
        Self::NonemptyBlank,
        Self::LeadingBadSpace,
        Self::IllegalIndent,
        Self::ContinuationOfBlank,
        Self::ContinuationToBlank,
        Self::EofLineContinuation,
        Self::UnindentedContinuation,
        Self::SpacelessContinuation,
        Self::CommentContinuation,
    ];

    /// Stable identifier used in output (`-w<name>`) and configuration
    fn name(self) -> &'static str {
        match self {
            Self::Makefile => "makefile",
            Self::ExtraMakefile => "extra-makefile",
            Self::Cmdline => "cmdline",
            Self::Text => "text",
            Self::Encoding => "encoding",
            Self::LongLine => "long-line",
            Self::NonemptyBlank => "nonempty-blank",
            Self::LeadingBadSpace => "leading-bad-space",
            Self::IllegalIndent => "illegal-indent",
            Self::ContinuationOfBlank => "continuation-of-blank",
            Self::ContinuationToBlank => "continuation-to-blank",
            Self::EofLineContinuation => "eof-line-continuation",
            Self::UnindentedContinuation => "unindented-continuation",
            Self::SpacelessContinuation => "spaceless-continuation",
            Self::CommentContinuation => "comment-continuation",
        }
    }

    fn default_action(self) -> Action {
        match self {
            Self::Makefile => Action::Inform,
            Self::LongLine | Self::NonemptyBlank => Action::WarnStyle,
            _ => Action::Warn,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|class| class.name() == name)
    }
}

/// Parse a `-w CLASS[=ACTION]` argument; a bare class name means `warn`
fn parse_warning_override(arg: &str) -> Result<(WarningClass, Action), String> {
    let (name, action) = match arg.split_once('=') {
        Some((name, action)) => (name.trim(), Some(action.trim())),
        None => (arg.trim(), None),
    };

    let class = WarningClass::from_name(name).ok_or_else(|| {
        format!(
            "unknown warning class '{}' (run `{} classes` for the list)",
            name, PROGRAM
        )
    })?;

    let action = match action {
        Some(action) => <Action as ValueEnum>::from_str(action, true)
            .map_err(|_| format!("unknown action '{}' (ignore|inform|style|warn)", action))?,
        None => Action::Warn,
    };

    Ok((class, action))
}

/// Read-only mapping from diagnostic class to action, built once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WarningRegistry {
    actions: [Action; WARNING_CLASS_COUNT],
}

impl Default for WarningRegistry {
    fn default() -> Self {
        Self {
            actions: WarningClass::ALL.map(WarningClass::default_action),
        }
    }
}

impl WarningRegistry {
    /// Build a registry from the defaults with `overrides` applied in order
    fn with_overrides<'a>(overrides: impl IntoIterator<Item = &'a (WarningClass, Action)>) -> Self {
        let mut registry = Self::default();
        for &(class, action) in overrides {
            registry.actions[class as usize] = action;
        }
        registry
    }

    fn action(&self, class: WarningClass) -> Action {
        self.actions[class as usize]
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Diagnostics
// ─────────────────────────────────────────────────────────────────────────────

/// Position a diagnostic refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Location {
    path: String,
    line: usize,
    /// Last line of a diagnostic that spans two lines
    #[serde(skip_serializing_if = "Option::is_none")]
    end_line: Option<usize>,
}

impl Location {
    fn new(path: &str, line: usize) -> Self {
        Self {
            path: path.to_string(),
            line,
            end_line: None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end_line {
            Some(end) => write!(f, "{}:{},{}", self.path, self.line, end),
            None => write!(f, "{}:{}", self.path, self.line),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum DiagnosticKind {
    Warn,
    Info,
    Tip,
}

/// One emitted diagnostic, after its class action has been applied
#[derive(Debug, Clone, Serialize)]
struct Diagnostic {
    class: WarningClass,
    kind: DiagnosticKind,
    /// Severity that escalated the exit status; `None` for informational output
    #[serde(skip_serializing_if = "Option::is_none")]
    severity: Option<Severity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    location: Option<Location>,
    message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.kind {
            DiagnosticKind::Warn => "warn",
            DiagnosticKind::Info => "info",
            DiagnosticKind::Tip => "tip",
        };
        write!(f, "{}: [{}] ", PROGRAM, tag)?;
        if let Some(location) = &self.location {
            write!(f, "{}: ", location)?;
        }
        write!(f, "{}", self.message)?;
        if self.severity.is_some() || self.location.is_some() {
            write!(f, " (-w{})", self.class.name())?;
        }
        Ok(())
    }
}

/// Per-source diagnostic sink and severity state.
///
/// Every component receives this explicitly; the highest severity reached is
/// read back by the driver once the source has been processed.
struct Diagnostics<'a> {
    registry: &'a WarningRegistry,
    severity: Option<Severity>,
    records: Vec<Diagnostic>,
}

impl<'a> Diagnostics<'a> {
    fn new(registry: &'a WarningRegistry) -> Self {
        Self {
            registry,
            severity: None,
            records: Vec::new(),
        }
    }

    /// Emit a diagnostic of `class`; escalates to `severity` unless the class
    /// is ignored or only informational.
    fn warn(
        &mut self,
        class: WarningClass,
        severity: Severity,
        location: Option<Location>,
        message: impl Into<String>,
    ) {
        let (kind, severity) = match self.registry.action(class) {
            Action::Ignore => return,
            Action::Inform => (DiagnosticKind::Info, None),
            Action::WarnStyle | Action::Warn => (DiagnosticKind::Warn, Some(severity)),
        };
        self.severity = self.severity.max(severity);
        self.records.push(Diagnostic {
            class,
            kind,
            severity,
            location,
            message: message.into(),
        });
    }

    /// Informational companion of a diagnostic; never escalates
    fn info(&mut self, class: WarningClass, message: impl Into<String>) {
        self.push_note(class, DiagnosticKind::Info, message.into());
    }

    /// Hint on how to avoid a diagnostic; never escalates
    fn tip(&mut self, class: WarningClass, message: impl Into<String>) {
        self.push_note(class, DiagnosticKind::Tip, message.into());
    }

    fn push_note(&mut self, class: WarningClass, kind: DiagnosticKind, message: String) {
        if self.registry.action(class) == Action::Ignore {
            return;
        }
        self.records.push(Diagnostic {
            class,
            kind,
            severity: None,
            location: None,
            message,
        });
    }

    fn records(&self) -> &[Diagnostic] {
        &self.records
    }

    fn finish(self) -> (Vec<Diagnostic>, Option<Severity>) {
        (self.records, self.severity)
    }
}

fn print_diagnostics(records: &[Diagnostic]) {
    for record in records {
        eprintln!("{}", record);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Style
// ─────────────────────────────────────────────────────────────────────────────

/// Preferred bracket style for macro expansions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MacroBracketStyle {
    /// Either style, mixed freely
    Inconsistent,
    /// `$(NAME)`
    #[default]
    Round,
    /// `${NAME}`
    Curly,
}

/// Style preferences; fixed before any line is checked
#[derive(Debug, Clone, PartialEq, Eq)]
struct Style {
    max_line_length: usize,
    only_empty_blank_lines: bool,
    macro_bracket_style: MacroBracketStyle,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            only_empty_blank_lines: true,
            macro_bracket_style: MacroBracketStyle::Round,
        }
    }
}

const DEFAULT_MAX_LINE_LENGTH: usize = 120;

// ─────────────────────────────────────────────────────────────────────────────
// Lines
// ─────────────────────────────────────────────────────────────────────────────

/// Longest line, including its `<newline>`, that text files are guaranteed
/// to support.
const POSIX_LINE_MAX: usize = 2048;

/// Character `make` substitutes for `<backslash><newline>` when joining lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Joiner {
    #[default]
    None,
    Space,
    Tab,
}

/// One physical line of a makefile
#[derive(Debug, Clone)]
struct Line {
    /// Line content without the `<newline>`; never contains a NUL byte
    data: Vec<u8>,
    path: Rc<str>,
    /// 1-based line number
    lineno: usize,
    /// Last line of its source
    eof: bool,
    /// Inclusion depth, 0 for the top-level makefile
    nest_level: usize,
    continuation_joiner: Joiner,
}

impl Line {
    fn is_continued(&self) -> bool {
        self.continuation_joiner != Joiner::None
    }

    fn location(&self) -> Location {
        Location::new(&self.path, self.lineno)
    }

    /// True when the line contains nothing but white space
    fn is_blank(&self) -> bool {
        self.data.iter().all(|&b| is_space(b))
    }
}

/// White space as the C locale defines it
fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

/// `<space>` or `<tab>`
fn is_blank(b: u8) -> bool {
    matches!(b, b' ' | b'\t')
}

fn print_long_line_tip(diags: &mut Diagnostics, class: WarningClass) {
    diags.tip(
        class,
        "you can put a <backslash> at the end of the line to continue it on the next line, \
         except in or immediately preceding an include line",
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Line Loader
// ─────────────────────────────────────────────────────────────────────────────

/// Read `reader` to the end and frame it into lines.
///
/// `read_to_end` retries interrupted reads; any other read failure is fatal.
fn load_text<R: Read>(
    mut reader: R,
    name: &str,
    nest_level: usize,
    diags: &mut Diagnostics,
) -> Result<Vec<Line>> {
    let mut buf = Vec::new();
    reader
        .read_to_end(&mut buf)
        .with_context(|| format!("Failed to read makefile: {}", name))?;
    Ok(split_lines(buf, name, nest_level, diags))
}

/// Split raw bytes into lines, repairing NUL bytes and a missing final
/// `<newline>`.
fn split_lines(mut buf: Vec<u8>, name: &str, nest_level: usize, diags: &mut Diagnostics) -> Vec<Line> {
    let mut nlines = 0;
    for byte in buf.iter_mut() {
        match *byte {
            b'\n' => nlines += 1,
            0 => {
                diags.warn(
                    WarningClass::Text,
                    Severity::Undefined,
                    Some(Location::new(name, nlines + 1)),
                    "file contains a NUL byte, this is disallowed, because input files \
                     are text files, and causes undefined behaviour",
                );
                diags.info(
                    WarningClass::Text,
                    "this implementation will replace it with a <space>",
                );
                *byte = b' ';
            }
            _ => {}
        }
    }

    if buf.last().is_some_and(|&b| b != b'\n') {
        diags.warn(
            WarningClass::Text,
            Severity::Undefined,
            Some(Location::new(name, nlines + 1)),
            "is non-empty but does not end with a <newline>, which is required because \
             input files are text files, and omission of it causes undefined behaviour",
        );
        diags.info(
            WarningClass::Text,
            "this implementation will add the missing <newline>",
        );
        buf.push(b'\n');
        nlines += 1;
    }

    let path: Rc<str> = Rc::from(name);
    let mut lines = Vec::with_capacity(nlines);
    for (i, segment) in buf.split(|&b| b == b'\n').take(nlines).enumerate() {
        let line = Line {
            data: segment.to_vec(),
            path: Rc::clone(&path),
            lineno: i + 1,
            eof: i + 1 == nlines,
            nest_level,
            continuation_joiner: Joiner::None,
        };

        if line.data.len() + 1 > POSIX_LINE_MAX {
            diags.warn(
                WarningClass::Text,
                Severity::Undefined,
                Some(line.location()),
                format!(
                    "line is, including the <newline> character, longer than {} bytes which \
                     causes undefined behaviour as input files are text files and POSIX only \
                     guarantees support for lines up to {} bytes long including the <newline> \
                     character in text files",
                    POSIX_LINE_MAX, POSIX_LINE_MAX
                ),
            );
            diags.info(
                WarningClass::Text,
                "this implementation supports arbitrarily long lines",
            );
            print_long_line_tip(diags, WarningClass::Text);
        }

        lines.push(line);
    }

    lines
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding Validator
// ─────────────────────────────────────────────────────────────────────────────

/// UTF-8 encoding of U+FFFD REPLACEMENT CHARACTER
const REPLACEMENT_CHARACTER_UTF8: [u8; 3] = [0xEF, 0xBF, 0xBD];

/// Replace every invalid UTF-8 sequence in `line` with U+FFFD.
///
/// The decoder decides how many bytes one invalid sequence spans. An
/// existing U+FFFD is valid UTF-8 and is left alone, so running this twice
/// changes nothing the second time.
fn check_utf8_encoding(line: &mut Line, diags: &mut Diagnostics) {
    let mut off = 0;
    while off < line.data.len() {
        let (valid, invalid) = match line.data[off..].utf8_chunks().next() {
            Some(chunk) => (chunk.valid().len(), chunk.invalid().len()),
            None => break,
        };
        off += valid;
        if invalid == 0 {
            continue;
        }

        diags.warn(
            WarningClass::Encoding,
            Severity::Unspecified,
            Some(line.location()),
            "line contains invalid UTF-8",
        );
        diags.info(
            WarningClass::Encoding,
            "this implementation will replace it with the Unicode replacement character (U+FFFD)",
        );

        drop(line.data.splice(off..off + invalid, REPLACEMENT_CHARACTER_UTF8));
        off += REPLACEMENT_CHARACTER_UTF8.len();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Column-Width Analyzer
// ─────────────────────────────────────────────────────────────────────────────

/// Terminal columns taken by one character.
///
/// Combining marks take 0 columns and wide (CJK, emoji) characters take 2.
/// Control characters have no defined width and count as 1.
fn char_columns(c: char) -> usize {
    c.width().unwrap_or(1)
}

/// Terminal columns taken by a byte string; each invalid sequence counts as
/// one U+FFFD.
fn display_columns(bytes: &[u8]) -> usize {
    bytes
        .utf8_chunks()
        .map(|chunk| {
            let invalid = usize::from(!chunk.invalid().is_empty());
            chunk.valid().chars().map(char_columns).sum::<usize>() + invalid
        })
        .sum()
}

/// Report lines wider than `style.max_line_length` columns.
///
/// A trailing continuation `<backslash>` is not part of the line's content
/// and is not counted.
fn check_column_count(line: &Line, style: &Style, diags: &mut Diagnostics) {
    let content = line.data.strip_suffix(b"\\").unwrap_or(&line.data[..]);

    // A character takes at least one byte and at most as many columns as bytes
    if content.len() <= style.max_line_length {
        return;
    }

    let columns = display_columns(content);
    if columns > style.max_line_length {
        diags.warn(
            WarningClass::LongLine,
            Severity::Style,
            Some(line.location()),
            format!(
                "line is {} columns long, which is longer than {} columns",
                columns, style.max_line_length
            ),
        );
        if line.data.len() + 1 <= POSIX_LINE_MAX {
            print_long_line_tip(diags, WarningClass::LongLine);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Continuation Joiner
// ─────────────────────────────────────────────────────────────────────────────

/// Strip a trailing `<backslash>` and record the joiner `make` will use
fn set_continuation_joiner(line: &mut Line) {
    if line.data.last() == Some(&b'\\') {
        line.data.pop();
        // Whether the first non-white space is `#` does not matter here
        line.continuation_joiner = if line.data.first() == Some(&b'\t') {
            Joiner::Tab
        } else {
            Joiner::Space
        };
    } else {
        line.continuation_joiner = Joiner::None;
    }
}

/// Resolve continuations over a whole source and report confusing patterns.
///
/// Must run after the per-line encoding and width checks, as it removes the
/// continuation `<backslash>` from each line.
fn check_line_continuations(lines: &mut [Line], diags: &mut Diagnostics) {
    // Last line of the current continuation run with content
    let mut cont_from = 0;

    for i in 0..lines.len() {
        set_continuation_joiner(&mut lines[i]);
        let prev_continued = i > 0 && lines[i - 1].is_continued();
        let line = &lines[i];

        if line.is_continued() && !prev_continued && line.is_blank() {
            diags.warn(
                WarningClass::ContinuationOfBlank,
                Severity::Confusing,
                Some(line.location()),
                "initial line continuation on otherwise blank line, can cause confusion",
            );
        }

        if !line.is_continued() && prev_continued && line.is_blank() {
            diags.warn(
                WarningClass::ContinuationToBlank,
                Severity::Confusing,
                Some(line.location()),
                "terminal line continuation to blank line, can cause confusion",
            );
        }

        if line.is_continued() && line.eof {
            let included = if line.nest_level > 0 {
                ", it is especially problematic in an included line"
            } else {
                ""
            };
            diags.warn(
                WarningClass::EofLineContinuation,
                Severity::Unspecified,
                Some(line.location()),
                format!(
                    "line continuation at end of file, causes unspecified behaviour{}",
                    included
                ),
            );
            diags.info(
                WarningClass::EofLineContinuation,
                "this implementation will remove the line continuation",
            );
            lines[i].continuation_joiner = Joiner::None;
        }

        let line = &lines[i];
        if prev_continued && !line.data.is_empty() {
            if !is_space(line.data[0]) {
                let from = &lines[cont_from];
                if from.data.last().is_some_and(|&b| !is_space(b)) {
                    let through = if i == cont_from + 1 {
                        ""
                    } else {
                        ", that consist of not only a <backslash>,"
                    };
                    diags.warn(
                        WarningClass::SpacelessContinuation,
                        Severity::Confusing,
                        Some(Location {
                            path: from.path.to_string(),
                            line: from.lineno,
                            end_line: Some(line.lineno),
                        }),
                        format!(
                            "<backslash> is preceded by a non-white space character at the same \
                             time as the next line{} begins with a non-white space character, \
                             this can cause confusion as the make utility will add a white space",
                            through
                        ),
                    );
                }
                diags.warn(
                    WarningClass::UnindentedContinuation,
                    Severity::Confusing,
                    Some(line.location()),
                    "continuation of line is not indented, can cause confusion",
                );
            }
            cont_from = i;
        } else if line.is_continued() && !prev_continued {
            cont_from = i;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Line Classifier
// ─────────────────────────────────────────────────────────────────────────────

/// Grammatical class of a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineClass {
    /// Zero-length line (a comment line to POSIX make)
    Empty,
    /// Only white space (a comment line to POSIX make)
    Blank,
    Comment,
    /// Starts with `<tab>`
    CommandLine,
    Other,
}

/// Classify `lines[index]`.
///
/// A blank line that is continued takes the class of the next line in its
/// continuation run; the walk never goes past the end of `lines`.
fn classify_line(lines: &[Line], index: usize, diags: &mut Diagnostics) -> LineClass {
    if lines[index].data.is_empty() {
        return LineClass::Empty;
    }

    let mut warned_bad_space = false;
    for line in &lines[index..] {
        let data = &line.data;
        let mut s = 0;
        while s < data.len() && is_space(data[s]) {
            if !warned_bad_space && !is_blank(data[s]) {
                warned_bad_space = true;
                diags.warn(
                    WarningClass::LeadingBadSpace,
                    Severity::Undefined,
                    Some(line.location()),
                    "line contains leading white space other than <space> and <tab>, \
                     which causes undefined behaviour",
                );
            }
            s += 1;
        }

        match data.get(s) {
            Some(b'#') => {
                if data[0] != b'#' {
                    diags.warn(
                        WarningClass::IllegalIndent,
                        Severity::Undefined,
                        Some(line.location()),
                        "comment has leading white space, which is not legal",
                    );
                    diags.info(
                        WarningClass::IllegalIndent,
                        "this implementation will recognise it as a comment line",
                    );
                }
                return LineClass::Comment;
            }
            None if line.is_continued() => continue,
            None => return LineClass::Blank,
            Some(_) if data[0] == b'\t' => return LineClass::CommandLine,
            Some(_) => return LineClass::Other,
        }
    }

    LineClass::Blank
}

/// Number of lines of each class in a source
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
struct LineClassCounts {
    empty: usize,
    blank: usize,
    comment: usize,
    command_line: usize,
    other: usize,
}

impl LineClassCounts {
    fn record(&mut self, class: LineClass) {
        match class {
            LineClass::Empty => self.empty += 1,
            LineClass::Blank => self.blank += 1,
            LineClass::Comment => self.comment += 1,
            LineClass::CommandLine => self.command_line += 1,
            LineClass::Other => self.other += 1,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lint Driver
// ─────────────────────────────────────────────────────────────────────────────

/// Run every check over the lines of one source.
///
/// Lines of a continuation run belong to the logical line that starts it and
/// are not classified on their own.
fn lint_lines(lines: &mut [Line], style: &Style, diags: &mut Diagnostics) -> LineClassCounts {
    for line in lines.iter_mut() {
        check_utf8_encoding(line, diags);
        check_column_count(line, style, diags);
    }

    check_line_continuations(lines, diags);

    let mut counts = LineClassCounts::default();
    let mut i = 0;
    while i < lines.len() {
        let class = classify_line(lines, i, diags);
        if class == LineClass::Blank && style.only_empty_blank_lines {
            diags.warn(
                WarningClass::NonemptyBlank,
                Severity::Style,
                Some(lines[i].location()),
                "line is blank but not empty",
            );
        }
        counts.record(class);

        while i < lines.len() && lines[i].is_continued() {
            if lines[i].data.contains(&b'#') {
                diags.warn(
                    WarningClass::CommentContinuation,
                    Severity::Confusing,
                    Some(lines[i].location()),
                    "using continuation of line to continue a comment on the next line \
                     can cause confusion",
                );
            }
            i += 1;
        }
        i += 1;
    }

    counts
}

/// Summary of one linted source
#[derive(Debug, Clone)]
struct LintReport {
    file: String,
    lines: usize,
    bytes: usize,
    classes: LineClassCounts,
    elapsed: Duration,
}

fn lint_reader<R: Read>(
    reader: R,
    name: &str,
    style: &Style,
    diags: &mut Diagnostics,
) -> Result<LintReport> {
    let start_time = Instant::now();
    let mut lines = load_text(reader, name, 0, diags)?;
    let bytes = lines.iter().map(|line| line.data.len() + 1).sum();
    let classes = lint_lines(&mut lines, style, diags);

    Ok(LintReport {
        file: name.to_string(),
        lines: lines.len(),
        bytes,
        classes,
        elapsed: start_time.elapsed(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Makefile Selection
// ─────────────────────────────────────────────────────────────────────────────

/// Makefiles tried, in order, when none is given
const DEFAULT_MAKEFILES: &[&str] = &["makefile", "Makefile"];

/// Display name of standard input
const STDIN_NAME: &str = "<stdin>";

#[derive(Debug, Clone, PartialEq, Eq)]
enum MakefileSource {
    Stdin,
    File(PathBuf),
}

impl MakefileSource {
    fn open(&self) -> Result<(Box<dyn Read>, String)> {
        match self {
            Self::Stdin => Ok((Box::new(io::stdin().lock()), STDIN_NAME.to_string())),
            Self::File(path) => {
                let file = fs::File::open(path)
                    .with_context(|| format!("Failed to open makefile: {}", path.display()))?;
                Ok((Box::new(file), path.display().to_string()))
            }
        }
    }
}

/// Pick the makefile from the `-f` operands, or look for a standard one in
/// `dir` when there are none.
///
/// `-f` may be repeated; the operands are processed in order, so the last
/// one wins.
fn select_makefile(files: &[String], dir: &Path, diags: &mut Diagnostics) -> Result<MakefileSource> {
    if files.len() > 1 {
        diags.warn(
            WarningClass::Cmdline,
            Severity::Unspecified,
            None,
            "the -f option has been specified multiple times, they are processed in order, \
             but the behaviour is otherwise unspecified",
        );
        diags.info(
            WarningClass::Cmdline,
            "this implementation will use the last option and discard earlier options",
        );
    }

    match files.last().map(String::as_str) {
        Some("-") => Ok(MakefileSource::Stdin),
        Some(path) => Ok(MakefileSource::File(PathBuf::from(path))),
        None => find_default_makefile(dir, diags),
    }
}

/// Try each standard makefile name in `dir`.
///
/// Only a missing file moves on to the next name; a file that exists but
/// cannot be opened is an error.
fn find_default_makefile(dir: &Path, diags: &mut Diagnostics) -> Result<MakefileSource> {
    for (i, name) in DEFAULT_MAKEFILES.iter().enumerate() {
        let path = dir.join(name);
        match fs::File::open(&path) {
            Ok(_) => {
                diags.info(
                    WarningClass::Makefile,
                    format!("found standard makefile to use: {}", path.display()),
                );
                for extra in &DEFAULT_MAKEFILES[i + 1..] {
                    let extra_path = dir.join(extra);
                    if extra_path.exists() {
                        diags.warn(
                            WarningClass::ExtraMakefile,
                            Severity::Warning,
                            None,
                            format!(
                                "found additional standard makefile, this can be confusing: {}",
                                extra_path.display()
                            ),
                        );
                    }
                }
                return Ok(MakefileSource::File(path));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(err).with_context(|| {
                    format!(
                        "found standard makefile to use, but failed to open: {}",
                        path.display()
                    )
                });
            }
        }
    }

    anyhow::bail!(
        "couldn't find any makefile to use, portable alternatives are ./makefile and ./Makefile"
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// CLI Arguments
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ColorMode {
    /// Auto-detect color support
    Auto,
    /// Always emit colors (even when not a TTY)
    Always,
    /// Never emit colors
    Never,
}

/// File-name patterns matched in recursive mode
const DEFAULT_GLOB: &str = "makefile,Makefile,*.mk";

/// Makefile linter: checks line structure, encoding and portability against POSIX make
#[derive(Parser, Debug)]
#[command(
    name = "makel",
    version,
    about,
    long_about = None,
    after_help = "EXIT CODES:\n  0  No warnings\n  1  Style\n  2  Confusing\n  3  Warning\n  4  Unspecified behaviour\n  5  Non-conforming\n  6  Undefined behaviour\n  7  Critical\n  8  Error (I/O failure, no makefile found, invalid arguments)\n"
)]
struct Args {
    /// Directories to search for makefiles (requires --recursive)
    #[arg(value_name = "DIR")]
    inputs: Vec<PathBuf>,

    /// Makefile to check, '-' for stdin (default: ./makefile or ./Makefile)
    #[arg(short = 'f', long = "file", value_name = "MAKEFILE")]
    files: Vec<String>,

    /// Maximum line length in display columns
    #[arg(short = 'l', long, default_value = "120")]
    max_line_length: usize,

    /// Do not report lines that are blank but not empty
    #[arg(long)]
    allow_blank_lines: bool,

    /// Set the action of a warning class: CLASS or CLASS=ignore|inform|style|warn
    #[arg(
        short = 'w',
        long = "warning",
        value_name = "CLASS[=ACTION]",
        value_parser = parse_warning_override
    )]
    warnings: Vec<(WarningClass, Action)>,

    /// Path to config file (default: search for .makelrc)
    #[arg(long = "config", value_name = "FILE")]
    config_file: Option<PathBuf>,

    /// Ignore config files
    #[arg(long = "no-config")]
    no_config: bool,

    /// Lint every makefile found under the given directories
    #[arg(short = 'r', long)]
    recursive: bool,

    /// Glob pattern to match makefiles when recursing (comma-separated)
    #[arg(long, default_value = DEFAULT_GLOB, requires = "recursive")]
    glob: String,

    /// Do not respect .gitignore when recursing
    #[arg(long = "no-gitignore", requires = "recursive")]
    no_gitignore: bool,

    /// Maximum directory depth (0 = unlimited)
    #[arg(long, default_value = "0", requires = "recursive")]
    max_depth: usize,

    /// Print a summary for each makefile
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Color output: auto, always, or never
    #[arg(long, value_enum, default_value = "auto")]
    color: ColorMode,

    /// Output results as JSON for programmatic processing
    #[arg(long, conflicts_with = "verbose")]
    json: bool,

    /// Watch the makefile for changes and lint it again on every save
    #[arg(long, conflicts_with_all = ["recursive", "json"])]
    watch: bool,

    /// Debounce interval in milliseconds (for --watch mode)
    #[arg(long, default_value = "500", requires = "watch")]
    debounce_ms: u64,

    /// Subcommand
    #[command(subcommand)]
    command: Option<Commands>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Subcommands
// ─────────────────────────────────────────────────────────────────────────────

/// Available subcommands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// List every warning class with its effective action
    Classes,
}

/// Config management actions
#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Initialize a new .makelrc config file
    Init {
        /// Create in home directory instead of current
        #[arg(long)]
        global: bool,
    },
    /// Show effective configuration (merged file + CLI)
    Show,
    /// Show path to active config file
    Path,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Runtime configuration derived from CLI args
#[derive(Debug)]
struct Config {
    style: Style,
    warnings: WarningRegistry,
    recursive: bool,
    glob: String,
    gitignore: bool,
    max_depth: usize,
    color: ColorMode,
    verbose: bool,
    json: bool,
    watch: bool,
    debounce_ms: u64,
}

impl From<&Args> for Config {
    fn from(args: &Args) -> Self {
        Self {
            style: Style {
                max_line_length: args.max_line_length,
                only_empty_blank_lines: !args.allow_blank_lines,
                macro_bracket_style: MacroBracketStyle::default(),
            },
            warnings: WarningRegistry::with_overrides(&args.warnings),
            recursive: args.recursive,
            glob: args.glob.clone(),
            gitignore: !args.no_gitignore,
            max_depth: args.max_depth,
            color: args.color,
            verbose: args.verbose,
            json: args.json,
            watch: args.watch,
            debounce_ms: args.debounce_ms,
        }
    }
}

struct VerboseStyle {
    use_color: bool,
}

impl VerboseStyle {
    fn new(use_color: bool) -> Self {
        Self { use_color }
    }

    fn wrap(&self, tag: &str, text: impl fmt::Display) -> String {
        if self.use_color {
            format!("[{}]{}[/]", tag, text)
        } else {
            text.to_string()
        }
    }

    fn header(&self, text: impl fmt::Display) -> String {
        self.wrap("bold cyan", text)
    }

    fn warn(&self, text: impl fmt::Display) -> String {
        self.wrap("yellow", text)
    }

    fn success(&self, text: impl fmt::Display) -> String {
        self.wrap("bold green", text)
    }

    fn dim(&self, text: impl fmt::Display) -> String {
        self.wrap("dim", text)
    }

    fn stat_label(&self, text: impl fmt::Display) -> String {
        self.wrap("bold blue", text)
    }

    fn separator(&self) -> String {
        self.wrap("dim", "───")
    }
}

fn build_console(color: ColorMode) -> (Console, VerboseStyle) {
    match color {
        ColorMode::Never => (Console::new(), VerboseStyle::new(false)),
        ColorMode::Always => {
            let system = terminal::detect_color_system().unwrap_or(ColorSystem::Standard);
            let console = Console::builder()
                .force_terminal(true)
                .color_system(system)
                .build();
            (console, VerboseStyle::new(true))
        }
        ColorMode::Auto => {
            if std::env::var("NO_COLOR").is_ok() {
                return (Console::new(), VerboseStyle::new(false));
            }

            if std::env::var("FORCE_COLOR").is_ok() {
                let system = terminal::detect_color_system().unwrap_or(ColorSystem::Standard);
                let console = Console::builder()
                    .force_terminal(true)
                    .color_system(system)
                    .build();
                return (console, VerboseStyle::new(true));
            }

            let console = Console::new();
            let use_color = console.is_color_enabled();
            (console, VerboseStyle::new(use_color))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Config File Support
// ─────────────────────────────────────────────────────────────────────────────

/// Config file names searched in order
const CONFIG_FILENAMES: &[&str] = &[".makelrc", ".makelrc.toml", "makelrc.toml"];

/// Configuration loaded from a .makelrc file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    /// Maximum line length in display columns
    max_line_length: Option<usize>,
    /// Report lines that are blank but not empty
    only_empty_blank_lines: Option<bool>,
    /// Preferred macro bracket style
    macro_bracket_style: Option<MacroBracketStyle>,
    /// Show verbose output
    verbose: Option<bool>,
    /// Color mode: auto, always, never
    color: Option<ColorMode>,
    /// Output as JSON
    json: Option<bool>,
    /// Enable recursive mode
    recursive: Option<bool>,
    /// Glob patterns for recursive mode
    glob: Option<String>,
    /// Respect .gitignore
    gitignore: Option<bool>,
    /// Maximum directory depth
    max_depth: Option<usize>,
    /// Warning class name to action
    warnings: HashMap<String, Action>,
}

/// Search for a config file starting from the given directory
fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();

    loop {
        for filename in CONFIG_FILENAMES {
            let config_path = current.join(filename);
            if config_path.exists() {
                return Some(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    if let Some(home) = dirs::home_dir() {
        for filename in CONFIG_FILENAMES {
            let config_path = home.join(filename);
            if config_path.exists() {
                return Some(config_path);
            }
        }
    }

    None
}

/// Load and parse a config file
fn load_config_file(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve the `[warnings]` table of a config file to class overrides
fn file_warning_overrides(file_config: &FileConfig, path: &Path) -> Result<Vec<(WarningClass, Action)>> {
    let mut overrides = Vec::with_capacity(file_config.warnings.len());
    for (name, &action) in &file_config.warnings {
        let class = WarningClass::from_name(name).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown warning class '{}' in config file: {}",
                name,
                path.display()
            )
        })?;
        overrides.push((class, action));
    }
    Ok(overrides)
}

/// Merge a parsed config file into `config`; CLI values win when they differ
/// from their defaults.
fn apply_file_config(config: &mut Config, args: &Args, file_config: &FileConfig, path: &Path) -> Result<()> {
    if args.max_line_length == DEFAULT_MAX_LINE_LENGTH {
        if let Some(length) = file_config.max_line_length {
            config.style.max_line_length = length;
        }
    }

    if !args.allow_blank_lines {
        if let Some(only_empty) = file_config.only_empty_blank_lines {
            config.style.only_empty_blank_lines = only_empty;
        }
    }

    if let Some(bracket_style) = file_config.macro_bracket_style {
        config.style.macro_bracket_style = bracket_style;
    }

    // File overrides first so that -w on the command line wins
    let mut overrides = file_warning_overrides(file_config, path)?;
    overrides.extend(args.warnings.iter().copied());
    config.warnings = WarningRegistry::with_overrides(&overrides);

    if !args.verbose {
        if let Some(v) = file_config.verbose {
            config.verbose = v;
        }
    }

    if args.color == ColorMode::Auto {
        if let Some(c) = file_config.color {
            config.color = c;
        }
    }

    if !args.json {
        if let Some(j) = file_config.json {
            config.json = j;
        }
    }

    if !args.recursive {
        if let Some(r) = file_config.recursive {
            config.recursive = r;
        }
    }

    if args.glob == DEFAULT_GLOB {
        if let Some(g) = &file_config.glob {
            config.glob = g.clone();
        }
    }

    if !args.no_gitignore {
        if let Some(gi) = file_config.gitignore {
            config.gitignore = gi;
        }
    }

    if args.max_depth == 0 {
        if let Some(d) = file_config.max_depth {
            config.max_depth = d;
        }
    }

    Ok(())
}

/// Create Config by merging file config with CLI args (CLI wins)
fn create_config(args: &Args) -> Result<Config> {
    let mut config = Config::from(args);

    if args.no_config {
        return Ok(config);
    }

    let config_path = if let Some(ref path) = args.config_file {
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }
        Some(path.clone())
    } else {
        let start_dir = args
            .inputs
            .first()
            .cloned()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
        find_config_file(&start_dir)
    };

    if let Some(path) = config_path {
        let file_config = load_config_file(&path)?;
        apply_file_config(&mut config, args, &file_config, &path)?;
    }

    Ok(config)
}

/// Default config file content
const DEFAULT_CONFIG: &str = r#"# .makelrc - makel configuration file

# Maximum line length in display columns
max_line_length = 120

# Report lines that contain only white space
only_empty_blank_lines = true

# Preferred macro bracket style: inconsistent, round or curly
# macro_bracket_style = "round"

# Output options
# verbose = false
# color = "auto"
# json = false

# Recursive mode defaults
# recursive = false
# glob = "makefile,Makefile,*.mk"
# gitignore = true
# max_depth = 0

# Action per warning class: ignore, inform, style or warn
[warnings]
# long-line = "ignore"
# nonempty-blank = "inform"
"#;

/// Run a subcommand
fn run_command(command: &Commands, args: &Args) -> Result<()> {
    match command {
        Commands::Config { action } => run_config_command(action, args),
        Commands::Classes => {
            let config = create_config(args)?;
            for class in WarningClass::ALL {
                println!(
                    "{:<26}{}",
                    class.name(),
                    config.warnings.action(class).name()
                );
            }
            Ok(())
        }
    }
}

/// Handle the config subcommand
fn run_config_command(action: &ConfigAction, args: &Args) -> Result<()> {
    match action {
        ConfigAction::Init { global } => {
            let path = if *global {
                dirs::home_dir()
                    .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?
                    .join(".makelrc")
            } else {
                PathBuf::from(".makelrc")
            };

            if path.exists() {
                return Err(anyhow::anyhow!(
                    "Config file already exists: {}",
                    path.display()
                ));
            }

            fs::write(&path, DEFAULT_CONFIG)
                .with_context(|| format!("Failed to create config file: {}", path.display()))?;

            eprintln!("Created config file: {}", path.display());
            Ok(())
        }

        ConfigAction::Show => {
            let config = create_config(args)?;

            eprintln!("Effective configuration:");
            eprintln!("  max_line_length: {}", config.style.max_line_length);
            eprintln!(
                "  only_empty_blank_lines: {}",
                config.style.only_empty_blank_lines
            );
            eprintln!(
                "  macro_bracket_style: {:?}",
                config.style.macro_bracket_style
            );
            eprintln!("  verbose: {}", config.verbose);
            eprintln!("  color: {:?}", config.color);
            eprintln!("  json: {}", config.json);
            eprintln!("  recursive: {}", config.recursive);
            eprintln!("  glob: {}", config.glob);
            eprintln!("  gitignore: {}", config.gitignore);
            eprintln!("  max_depth: {}", config.max_depth);
            eprintln!("  warnings:");
            for class in WarningClass::ALL {
                eprintln!(
                    "    {}: {}",
                    class.name(),
                    config.warnings.action(class).name()
                );
            }

            let start_dir = std::env::current_dir().unwrap_or_default();
            if let Some(path) = find_config_file(&start_dir) {
                eprintln!();
                eprintln!("Config file: {}", path.display());
            }

            Ok(())
        }

        ConfigAction::Path => {
            let start_dir = std::env::current_dir().unwrap_or_default();
            if let Some(path) = find_config_file(&start_dir) {
                println!("{}", path.display());
                Ok(())
            } else {
                eprintln!("No config file found");
                std::process::exit(exit_codes::NO_CONFIG);
            }
        }
    }
}

fn validate_args(args: &Args, config: &Config) -> Result<()> {
    if config.style.max_line_length == 0 {
        return Err(ArgError("--max-line-length must be at least 1".to_string()).into());
    }

    if !args.inputs.is_empty() && !config.recursive {
        return Err(ArgError(
            "DIR operands require --recursive; use -f to select a makefile".to_string(),
        )
        .into());
    }

    if config.recursive && !args.files.is_empty() {
        return Err(ArgError("--file cannot be combined with --recursive".to_string()).into());
    }

    if config.watch {
        match args.files.as_slice() {
            [path] if path != "-" => {}
            _ => {
                return Err(
                    ArgError("--watch requires exactly one -f <makefile>".to_string()).into(),
                );
            }
        }
    }

    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON Output Structures
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonOutput<'a> {
    version: &'static str,
    exit_status: i32,
    files: Vec<JsonFile<'a>>,
}

#[derive(Serialize)]
struct JsonFile<'a> {
    file: &'a str,
    lines: usize,
    bytes: usize,
    classes: &'a LineClassCounts,
    #[serde(skip_serializing_if = "Option::is_none")]
    severity: Option<Severity>,
    exit_status: i32,
    diagnostics: &'a [Diagnostic],
}

// ─────────────────────────────────────────────────────────────────────────────
// Recursive File Discovery
// ─────────────────────────────────────────────────────────────────────────────

fn build_globset(patterns: &str) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    let mut added = 0;

    for raw in patterns.split(',') {
        let pattern = raw.trim();
        if pattern.is_empty() {
            continue;
        }

        let glob = Glob::new(pattern)
            .map_err(|err| ArgError(format!("Invalid glob pattern '{}': {}", pattern, err)))?;
        builder.add(glob);
        added += 1;
    }

    if added == 0 {
        return Err(ArgError("--glob must include at least one pattern".to_string()).into());
    }

    builder
        .build()
        .map_err(|err| ArgError(format!("Invalid glob set: {}", err)).into())
}

fn discover_makefiles(
    paths: &[PathBuf],
    config: &Config,
    console: &Console,
    styles: &VerboseStyle,
) -> Result<Vec<PathBuf>> {
    let globs = build_globset(&config.glob)?;
    let mut files = std::collections::BTreeSet::new();

    for path in paths {
        if path.is_file() {
            files.insert(path.clone());
            continue;
        }

        if !path.is_dir() {
            if config.verbose {
                console.print(
                    &styles
                        .dim(format!("Warning: path does not exist: {}", path.display())),
                );
            }
            continue;
        }

        let mut walker = WalkBuilder::new(path);
        walker.git_ignore(config.gitignore);
        walker.git_exclude(config.gitignore);
        walker.git_global(config.gitignore);
        walker.ignore(config.gitignore);
        walker.hidden(false);

        if config.max_depth > 0 {
            walker.max_depth(Some(config.max_depth));
        }

        for entry in walker.build() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    if config.verbose {
                        console.print(&styles.dim(format!("Warning: {}", err)));
                    }
                    continue;
                }
            };

            let entry_path = entry.path();
            if entry_path.is_file() {
                if let Some(name) = entry_path.file_name() {
                    if globs.is_match(name) {
                        files.insert(entry_path.to_path_buf());
                    }
                }
            }
        }
    }

    Ok(files.into_iter().collect())
}

// ─────────────────────────────────────────────────────────────────────────────
// Entry Point
// ─────────────────────────────────────────────────────────────────────────────

/// Result of linting a single makefile
struct FileResult {
    report: LintReport,
    diagnostics: Vec<Diagnostic>,
    severity: Option<Severity>,
}

impl FileResult {
    fn exit_code(&self) -> i32 {
        self.severity
            .map_or(exit_codes::SUCCESS, Severity::exit_code)
    }
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = match err.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_codes::SUCCESS,
                _ => exit_codes::ERROR,
            };
            let _ = err.print();
            std::process::exit(code);
        }
    };

    if let Some(command) = &args.command {
        let exit_code = match run_command(command, &args) {
            Ok(()) => exit_codes::SUCCESS,
            Err(err) => {
                eprintln!("{}: [error] {:#}", PROGRAM, err);
                exit_codes::ERROR
            }
        };
        std::process::exit(exit_code);
    }

    let exit_code = match run(args) {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            eprintln!("{}: [error] {:#}", PROGRAM, err);
            exit_codes::ERROR
        }
    };

    std::process::exit(exit_code);
}

/// Lint an already selected makefile with a fresh diagnostic context
fn lint_source(
    source: &MakefileSource,
    style: &Style,
    diags: &mut Diagnostics,
) -> Result<LintReport> {
    let (reader, name) = source.open()?;
    lint_reader(reader, &name, style, diags)
}

fn lint_path(path: &Path, config: &Config) -> Result<FileResult> {
    let mut diags = Diagnostics::new(&config.warnings);
    let report = lint_source(&MakefileSource::File(path.to_path_buf()), &config.style, &mut diags)?;
    let (diagnostics, severity) = diags.finish();
    Ok(FileResult {
        report,
        diagnostics,
        severity,
    })
}

fn run(args: Args) -> Result<RunOutcome> {
    let config = create_config(&args)?;
    validate_args(&args, &config)?;
    let (console, styles) = build_console(config.color);

    if config.watch {
        let path = PathBuf::from(&args.files[0]);
        return watch_and_lint(&path, &config, &console, &styles);
    }

    if config.recursive {
        let roots = if args.inputs.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            args.inputs.clone()
        };
        let files = discover_makefiles(&roots, &config, &console, &styles)?;
        if files.is_empty() {
            let message = format!(
                "Warning: No files matched pattern '{}' in provided paths",
                config.glob
            );
            if config.verbose {
                console.print(&styles.dim(message));
            } else {
                eprintln!("{}", message);
            }
            return Ok(RunOutcome { severity: None });
        }

        return lint_multiple(&config, &console, &styles, &files);
    }

    let mut diags = Diagnostics::new(&config.warnings);
    let report = select_makefile(&args.files, Path::new(""), &mut diags)
        .and_then(|source| lint_source(&source, &config.style, &mut diags));

    match report {
        Ok(report) => {
            let (diagnostics, severity) = diags.finish();
            let result = FileResult {
                report,
                diagnostics,
                severity,
            };
            output_results(&config, &console, &styles, std::slice::from_ref(&result))?;
            Ok(RunOutcome { severity })
        }
        Err(err) => {
            // Diagnostics emitted before the failure still reach the user
            print_diagnostics(diags.records());
            Err(err)
        }
    }
}

/// Lint every discovered makefile; the run's severity is the maximum over
/// all of them.
fn lint_multiple(
    config: &Config,
    console: &Console,
    styles: &VerboseStyle,
    paths: &[PathBuf],
) -> Result<RunOutcome> {
    let mut results = Vec::with_capacity(paths.len());
    let mut errors: Vec<(PathBuf, anyhow::Error)> = Vec::new();

    for path in paths {
        match lint_path(path, config) {
            Ok(result) => results.push(result),
            Err(e) => {
                eprintln!("{}: [error] {}: {:#}", PROGRAM, path.display(), e);
                errors.push((path.clone(), e));
            }
        }
    }

    output_results(config, console, styles, &results)?;

    if config.verbose {
        print_run_summary(&results, errors.len(), console, styles);
    }

    if !errors.is_empty() {
        let files = errors
            .iter()
            .map(|(p, _)| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        anyhow::bail!("{} file(s) had errors: {}", errors.len(), files);
    }

    Ok(RunOutcome {
        severity: results.iter().filter_map(|result| result.severity).max(),
    })
}

/// Render results as JSON on stdout, or as diagnostics on stderr
fn output_results(
    config: &Config,
    console: &Console,
    styles: &VerboseStyle,
    results: &[FileResult],
) -> Result<()> {
    if config.json {
        let json_output = JsonOutput {
            version: "1.0",
            exit_status: results
                .iter()
                .map(FileResult::exit_code)
                .max()
                .unwrap_or(exit_codes::SUCCESS),
            files: results
                .iter()
                .map(|result| JsonFile {
                    file: &result.report.file,
                    lines: result.report.lines,
                    bytes: result.report.bytes,
                    classes: &result.report.classes,
                    severity: result.severity,
                    exit_status: result.exit_code(),
                    diagnostics: &result.diagnostics,
                })
                .collect(),
        };

        println!(
            "{}",
            serde_json::to_string_pretty(&json_output)
                .context("Failed to serialize JSON output")?
        );
        return Ok(());
    }

    for result in results {
        print_diagnostics(&result.diagnostics);
        if config.verbose {
            print_file_summary(result, console, styles);
        }
    }

    Ok(())
}

/// Print a per-makefile summary
fn print_file_summary(result: &FileResult, console: &Console, styles: &VerboseStyle) {
    let report = &result.report;
    let classes = &report.classes;

    console.print(&styles.header(format!("{} {}", styles.separator(), report.file)));
    console.print(&format!(
        "  {} {} ({} empty, {} blank, {} comment, {} command, {} other)",
        styles.stat_label("Lines:"),
        report.lines,
        classes.empty,
        classes.blank,
        classes.comment,
        classes.command_line,
        classes.other
    ));

    let warnings = result
        .diagnostics
        .iter()
        .filter(|d| d.kind == DiagnosticKind::Warn)
        .count();
    let status = match result.severity {
        Some(severity) => styles.warn(format!(
            "{} warning(s), highest severity {} (exit status {})",
            warnings,
            severity.name(),
            severity.exit_code()
        )),
        None => styles.success("no warnings"),
    };
    console.print(&format!("  {} {}", styles.stat_label("Result:"), status));

    let elapsed_ms = report.elapsed.as_secs_f64() * 1000.0;
    console.print(&format!(
        "  {} {:.2}ms ({} bytes)",
        styles.stat_label("Time:"),
        elapsed_ms,
        report.bytes
    ));
}

/// Print a summary over all linted makefiles
fn print_run_summary(
    results: &[FileResult],
    errors: usize,
    console: &Console,
    styles: &VerboseStyle,
) {
    let with_warnings = results.iter().filter(|r| r.severity.is_some()).count();
    let lines: usize = results.iter().map(|r| r.report.lines).sum();

    console.print("");
    console.print(&format!(
        "{} Summary {}",
        styles.separator(),
        styles.separator()
    ));
    console.print(&format!(
        "  {} {} checked, {} with warnings, {} clean",
        styles.stat_label("Files:"),
        results.len(),
        with_warnings,
        results.len().saturating_sub(with_warnings)
    ));
    console.print(&format!("  {} {}", styles.stat_label("Lines:"), lines));

    if errors > 0 {
        console.print(&format!(
            "  {} {}",
            styles.wrap("bold red", "Errors:"),
            errors
        ));
    }

    console.print("");
}

// ─────────────────────────────────────────────────────────────────────────────
// Watch Mode
// ─────────────────────────────────────────────────────────────────────────────

/// Lint a makefile now and again on every save until Ctrl+C
fn watch_and_lint(
    path: &Path,
    config: &Config,
    console: &Console,
    styles: &VerboseStyle,
) -> Result<RunOutcome> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    if !path.is_file() {
        anyhow::bail!(
            "--watch requires a file, not a directory: {}",
            path.display()
        );
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let (tx, rx) = mpsc::channel();
    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        notify::Config::default(),
    )
    .context("Failed to create file watcher")?;

    watcher
        .watch(path, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch file: {}", path.display()))?;

    let debounce = Duration::from_millis(config.debounce_ms);
    let mut last_event = Instant::now();

    eprintln!(
        "Watching {} for changes (Ctrl+C to stop)...",
        path.display()
    );

    let mut severity = relint(path, config, console, styles, None);

    while running.load(Ordering::SeqCst) {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(event) => {
                if matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    let now = Instant::now();
                    if now.duration_since(last_event) >= debounce {
                        last_event = now;
                        severity = relint(path, config, console, styles, severity);
                    }
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }

    eprintln!("\nWatch mode stopped.");

    Ok(RunOutcome { severity })
}

/// Lint once for watch mode; keeps `previous` when the file cannot be read
fn relint(
    path: &Path,
    config: &Config,
    console: &Console,
    styles: &VerboseStyle,
    previous: Option<Severity>,
) -> Option<Severity> {
    match lint_path(path, config) {
        Ok(result) => {
            print_diagnostics(&result.diagnostics);
            if config.verbose {
                print_file_summary(&result, console, styles);
            }
            match result.severity {
                Some(severity) => eprintln!(
                    "✗ {} (exit status {})",
                    severity.name(),
                    severity.exit_code()
                ),
                None => eprintln!("✓ No warnings"),
            }
            result.severity
        }
        Err(e) => {
            eprintln!("✗ Error reading file: {:#}", e);
            previous
        }
    }
}
