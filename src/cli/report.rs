//! cli/report — вывод находок и итоговой строки в переданный sink.
//!
//! Текстовый формат: одна строка на ошибку, затем ровно одна из
//! `OK` / `<N> errors found`. JSON-формат (`--json`): JSONL, по объекту
//! на ошибку и итоговый объект статуса.
//! Ошибки записи не глотаются: вызывающий трактует их как операционный сбой.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

use crate::check::CheckError;
use crate::consts::Pgid;

pub trait Reporter {
    fn emit_error(&mut self, e: &CheckError) -> Result<()>;
    fn emit_summary(&mut self, count: u64) -> Result<()>;
    fn emit_ok(&mut self) -> Result<()>;
}

pub struct TextReporter<W: Write> {
    out: W,
}

impl<W: Write> TextReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Reporter for TextReporter<W> {
    fn emit_error(&mut self, e: &CheckError) -> Result<()> {
        writeln!(self.out, "{}", e).context("write check error")
    }

    fn emit_summary(&mut self, count: u64) -> Result<()> {
        writeln!(self.out, "{} errors found", count).context("write summary")?;
        self.out.flush().context("flush report")
    }

    fn emit_ok(&mut self) -> Result<()> {
        writeln!(self.out, "OK").context("write summary")?;
        self.out.flush().context("flush report")
    }
}

#[derive(Serialize)]
struct ErrorLine<'a> {
    page: Option<Pgid>,
    kind: &'a str,
    message: String,
}

#[derive(Serialize)]
struct StatusLine {
    status: &'static str,
    errors: u64,
}

pub struct JsonReporter<W: Write> {
    out: W,
}

impl<W: Write> JsonReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line<T: Serialize>(&mut self, v: &T) -> Result<()> {
        serde_json::to_writer(&mut self.out, v).context("serialize report line")?;
        writeln!(self.out).context("write report line")
    }
}

impl<W: Write> Reporter for JsonReporter<W> {
    fn emit_error(&mut self, e: &CheckError) -> Result<()> {
        self.line(&ErrorLine {
            page: e.page(),
            kind: e.kind(),
            message: e.to_string(),
        })
    }

    fn emit_summary(&mut self, count: u64) -> Result<()> {
        self.line(&StatusLine {
            status: "corrupt",
            errors: count,
        })?;
        self.out.flush().context("flush report")
    }

    fn emit_ok(&mut self) -> Result<()> {
        self.line(&StatusLine {
            status: "ok",
            errors: 0,
        })?;
        self.out.flush().context("flush report")
    }
}
