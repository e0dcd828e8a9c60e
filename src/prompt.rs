// serialctl - interactive serial number lookup against the ConfigMgr AdminService
// Copyright (C) 2025
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::Result;
use std::io::{BufRead, Write};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("invalid selection {input:?} (expected an index or A for all)")]
pub struct SelectionError {
    pub input: String,
}

/// Narrow a candidate list through one round of interactive input.
///
/// Lists of zero or one item pass through without a prompt. Otherwise each
/// item is rendered with its zero-based index, and one line is read:
/// case-insensitive `A` selects everything, an in-range index selects that
/// item, anything else is a `SelectionError`. There is no re-prompt here;
/// the outer loop restarting is the retry.
pub fn disambiguate<T: Clone>(
    items: Vec<T>,
    display: impl Fn(&T) -> String,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<Vec<T>> {
    if items.len() <= 1 {
        return Ok(items);
    }

    writeln!(output, "Multiple matches:")?;
    for (idx, item) in items.iter().enumerate() {
        writeln!(output, "  [{idx}] {}", display(item))?;
    }
    write!(output, "Select an index, or A for all: ")?;
    output.flush()?;

    let line = read_line(input)?.unwrap_or_default();
    let choice = line.trim();
    if choice.eq_ignore_ascii_case("a") {
        return Ok(items);
    }
    match choice.parse::<usize>() {
        Ok(idx) if idx < items.len() => Ok(vec![items[idx].clone()]),
        _ => Err(SelectionError {
            input: choice.to_string(),
        }
        .into()),
    }
}

/// One line of input without its trailing newline; `None` on end of input.
pub fn read_line(input: &mut impl BufRead) -> std::io::Result<Option<String>> {
    let mut buf = String::new();
    if input.read_line(&mut buf)? == 0 {
        return Ok(None);
    }
    Ok(Some(buf.trim_end_matches(['\r', '\n']).to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run(items: Vec<&'static str>, typed: &str) -> (Result<Vec<&'static str>>, String) {
        let mut input = Cursor::new(typed.to_string());
        let mut output = Vec::new();
        let result = disambiguate(items, |s| s.to_string(), &mut input, &mut output);
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn empty_and_singleton_lists_pass_through_without_prompting() {
        let (result, rendered) = run(vec![], "ignored");
        assert!(result.unwrap().is_empty());
        assert!(rendered.is_empty());

        let (result, rendered) = run(vec!["only"], "ignored");
        assert_eq!(result.unwrap(), vec!["only"]);
        assert!(rendered.is_empty());
    }

    #[test]
    fn index_selects_a_single_item() {
        let (result, rendered) = run(vec!["a", "b", "c"], "1\n");
        assert_eq!(result.unwrap(), vec!["b"]);
        assert!(rendered.contains("[0] a"));
        assert!(rendered.contains("[2] c"));
    }

    #[test]
    fn a_selects_the_whole_list_case_insensitively() {
        let (result, _) = run(vec!["a", "b", "c"], "A\n");
        assert_eq!(result.unwrap(), vec!["a", "b", "c"]);

        let (result, _) = run(vec!["a", "b", "c"], "a\n");
        assert_eq!(result.unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn out_of_range_nonnumeric_and_empty_input_are_selection_errors() {
        for typed in ["5\n", "x\n", "\n", ""] {
            let (result, _) = run(vec!["a", "b", "c"], typed);
            let err = result.unwrap_err();
            assert!(err.downcast_ref::<SelectionError>().is_some(), "{typed:?}");
        }
    }

    #[test]
    fn read_line_strips_newline_and_reports_eof() {
        let mut input = Cursor::new("one\r\ntwo");
        assert_eq!(read_line(&mut input).unwrap(), Some("one".to_string()));
        assert_eq!(read_line(&mut input).unwrap(), Some("two".to_string()));
        assert_eq!(read_line(&mut input).unwrap(), None);
    }
}
