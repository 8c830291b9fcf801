//! Terminal formatting for postings lookups

use crate::index::postings;
use crate::index::reader::IndexReader;
use crate::index::types::PostingsList;
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// How a lookup is printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupFormat {
    /// One line per document with its name and positions
    #[default]
    Documents,
    /// The stored blob text, `term d:p,p.d:p`
    Raw,
}

/// Print lookups for several terms to stdout
pub fn print_lookups(
    reader: &IndexReader,
    results: &[(String, Option<PostingsList>)],
    format: LookupFormat,
    color: bool,
) -> io::Result<()> {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut stdout = StandardStream::stdout(choice);

    for (i, (term, list)) in results.iter().enumerate() {
        if i > 0 && format == LookupFormat::Documents {
            writeln!(stdout)?;
        }
        write_lookup(&mut stdout, reader, term, list.as_ref(), format)?;
    }
    Ok(())
}

/// Write one term's postings
pub fn write_lookup<W: WriteColor>(
    out: &mut W,
    reader: &IndexReader,
    term: &str,
    list: Option<&PostingsList>,
    format: LookupFormat,
) -> io::Result<()> {
    let Some(list) = list else {
        out.set_color(ColorSpec::new().set_fg(Some(Color::Red)))?;
        write!(out, "{}", term)?;
        out.reset()?;
        writeln!(out, ": not found")?;
        return Ok(());
    };

    if format == LookupFormat::Raw {
        writeln!(out, "{}", postings::encode(term, list))?;
        return Ok(());
    }

    out.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)).set_bold(true))?;
    write!(out, "{}", term)?;
    out.reset()?;
    let noun = if list.len() == 1 { "document" } else { "documents" };
    writeln!(out, " ({} {})", list.len(), noun)?;

    for entry in list {
        write!(out, "  ")?;
        out.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
        write!(out, "{}", entry.doc_id)?;
        out.reset()?;

        let name = reader.doc_name(entry.doc_id).unwrap_or("?");
        write!(out, " {} tf={}", name, entry.frequency())?;
        if let Some(length) = reader.doc_length(entry.doc_id) {
            write!(out, "/{}", length)?;
        }
        if let Some(score) = reader.authority_score(entry.doc_id) {
            write!(out, " authority={:.4}", score)?;
        }

        out.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
        let positions: Vec<String> = entry.positions.iter().map(|p| p.to_string()).collect();
        writeln!(out, " @{}", positions.join(","))?;
        out.reset()?;
    }

    Ok(())
}
