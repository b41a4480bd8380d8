//! Flat-file record parsers using nom
//!
//! Fixed-width format (first line is a header and is skipped by the reader):
//! ```text
//! ID        NAME
//! 0000000001Pencil
//! 0000000002Eraser
//! ```
//!
//! Tab-separated format:
//! ```text
//! ABC0001<TAB>Pencil<TAB>120
//! ABC0002<TAB>Eraser<TAB>80
//! ```

use nom::{
    bytes::complete::{is_not, take},
    character::complete::{char, digit1},
    combinator::{all_consuming, map_res, rest},
    sequence::tuple,
    IResult,
};

use crate::error::Result;

/// Width of the id column in fixed-width files
pub const ID_WIDTH: usize = 10;

fn fixed_width_record(input: &str) -> IResult<&str, (&str, &str)> {
    tuple((take(ID_WIDTH), rest))(input)
}

fn tsv_record(input: &str) -> IResult<&str, (&str, &str, u32)> {
    let (input, (code, _, name, _, price)) = all_consuming(tuple((
        is_not("\t"),
        char('\t'),
        is_not("\t"),
        char('\t'),
        map_res(digit1, |digits: &str| digits.parse::<u32>()),
    )))(input)?;

    Ok((input, (code, name, price)))
}

/// Parse one fixed-width record into trimmed `(id, name)`
///
/// Lines shorter than the id column are rejected.
pub fn parse_fixed_width(line: &str) -> Result<(&str, &str)> {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    let (_, (id, name)) = fixed_width_record(line)?;
    Ok((id.trim(), name.trim()))
}

/// Parse one tab-separated record into `(code, name, price)`
pub fn parse_tsv(line: &str) -> Result<(&str, &str, u32)> {
    let line = line.trim();
    let (_, (code, name, price)) = tsv_record(line)?;
    Ok((code.trim(), name.trim(), price))
}
