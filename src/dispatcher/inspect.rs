use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use super::Context;
use crate::cli::formatters::{format_formats_table, format_inspect, to_json};
use crate::importers::FormatDescriptor;

pub fn dispatch_formats(ctx: &Context) -> Result<()> {
    let descriptors: Vec<FormatDescriptor> =
        ctx.registry.formats().iter().map(|k| k.descriptor()).collect();

    if ctx.json {
        println!("{}", to_json(&descriptors));
    } else {
        print!("{}", format_formats_table(&descriptors));
    }
    Ok(())
}

pub fn dispatch_inspect(ctx: &Context, file: &Path) -> Result<()> {
    #[derive(Serialize)]
    struct JsonSheet<'a> {
        name: &'a str,
        rows: usize,
        columns: usize,
        visible: bool,
    }

    #[derive(Serialize)]
    struct JsonInspect<'a> {
        sheets: Vec<JsonSheet<'a>>,
        claimed_by: Vec<&'static str>,
        detected: Option<&'static str>,
    }

    let workbook = ctx.open_workbook(file)?;
    let probes: Vec<_> = ctx
        .registry
        .formats()
        .iter()
        .map(|kind| (*kind, kind.can_process(&workbook, None)))
        .collect();

    if ctx.json {
        let report = JsonInspect {
            sheets: workbook
                .sheets()
                .iter()
                .map(|s| JsonSheet {
                    name: &s.name,
                    rows: s.height(),
                    columns: s.width(),
                    visible: s.visible,
                })
                .collect(),
            claimed_by: probes
                .iter()
                .filter(|(_, claims)| *claims)
                .map(|(kind, _)| kind.name())
                .collect(),
            detected: ctx.registry.detect(&workbook, None).map(|k| k.name()),
        };
        println!("{}", to_json(&report));
    } else {
        print!(
            "{}",
            format_inspect(&file.display().to_string(), &workbook, &probes)
        );
    }
    Ok(())
}
