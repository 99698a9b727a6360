//! Plain-text 4x4 transform matrices: four lines of four whitespace-separated
//! values, row-major.

use cv_core::{Error, Result};
use nalgebra::Matrix4;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

pub fn write_matrix<W: Write>(writer: &mut W, matrix: &Matrix4<f32>) -> Result<()> {
    for row in matrix.row_iter() {
        let values: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        writeln!(writer, "{}", values.join(" "))?;
    }
    Ok(())
}

/// Parse a matrix. Blank lines and `#` comments are ignored; exactly 16
/// values across 4 rows are required.
pub fn parse_matrix<R: BufRead>(reader: R) -> Result<Matrix4<f32>> {
    let mut rows: Vec<[f32; 4]> = Vec::with_capacity(4);
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values = line
            .split_whitespace()
            .map(|s| {
                s.parse::<f32>()
                    .map_err(|_| Error::Parse(format!("invalid matrix entry '{s}'")))
            })
            .collect::<Result<Vec<f32>>>()?;
        let row: [f32; 4] = values.as_slice().try_into().map_err(|_| {
            Error::Parse(format!("matrix row has {} values, expected 4", values.len()))
        })?;
        rows.push(row);
    }
    if rows.len() != 4 {
        return Err(Error::Parse(format!(
            "matrix has {} rows, expected 4",
            rows.len()
        )));
    }
    Ok(Matrix4::from_fn(|r, c| rows[r][c]))
}

pub fn save_matrix(path: impl AsRef<Path>, matrix: &Matrix4<f32>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    write_matrix(&mut writer, matrix)?;
    writer.flush()?;
    Ok(())
}

pub fn load_matrix(path: impl AsRef<Path>) -> Result<Matrix4<f32>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::load(path, e))?;
    parse_matrix(BufReader::new(file)).map_err(|e| Error::load(path, e))
}
