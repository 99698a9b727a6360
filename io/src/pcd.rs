//! PCD (Point Cloud Data) I/O
//!
//! PCD is the native format for Point Cloud Library (PCL). Records are
//! decoded into any [`PointRecord`] by field name, so one reader serves
//! `PointXYZ`, `PointXYZI` and `PointNormal` clouds alike.

use cv_core::{Error, PointCloud, PointRecord, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// PCD data format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PcdData {
    #[default]
    Ascii,
    Binary,
    BinaryCompressed,
}

/// Parsed PCD header.
#[derive(Debug, Clone, PartialEq)]
pub struct PcdHeader {
    pub version: String,
    pub fields: Vec<String>,
    pub sizes: Vec<usize>,
    pub types: Vec<char>,
    pub counts: Vec<usize>,
    pub width: usize,
    pub height: usize,
    /// tx, ty, tz, qw, qx, qy, qz
    pub viewpoint: [f32; 7],
    pub points: usize,
    pub data: PcdData,
}

impl PcdHeader {
    fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }

    /// Bytes per record in a binary payload.
    fn point_step(&self) -> usize {
        self.sizes.iter().zip(&self.counts).map(|(s, c)| s * c).sum()
    }

    /// Values per record in an ASCII payload.
    fn ascii_columns(&self) -> usize {
        self.counts.iter().sum()
    }

    fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(Error::Parse("missing FIELDS line".to_string()));
        }
        let n = self.fields.len();
        if self.sizes.len() != n || self.types.len() != n || self.counts.len() != n {
            return Err(Error::Parse(format!(
                "FIELDS/SIZE/TYPE/COUNT length mismatch ({}/{}/{}/{})",
                n,
                self.sizes.len(),
                self.types.len(),
                self.counts.len()
            )));
        }
        for ((name, &size), &ty) in self.fields.iter().zip(&self.sizes).zip(&self.types) {
            let valid = match ty {
                'F' => matches!(size, 4 | 8),
                'I' | 'U' => matches!(size, 1 | 2 | 4 | 8),
                _ => false,
            };
            if !valid {
                return Err(Error::Parse(format!(
                    "field '{name}' has unsupported type {ty}{size}"
                )));
            }
        }
        if self.counts.iter().any(|&c| c == 0) {
            return Err(Error::Parse("COUNT entries must be at least 1".to_string()));
        }
        let step = self
            .sizes
            .iter()
            .zip(&self.counts)
            .try_fold(0usize, |acc, (&s, &c)| s.checked_mul(c)?.checked_add(acc));
        if step.is_none() {
            return Err(Error::Parse("record size overflows".to_string()));
        }
        for axis in ["x", "y", "z"] {
            if self.field_index(axis).is_none() {
                return Err(Error::Parse(format!("missing required field '{axis}'")));
            }
        }
        Ok(())
    }
}

fn parse_list<T: std::str::FromStr>(keyword: &str, parts: &[&str]) -> Result<Vec<T>> {
    parts
        .iter()
        .map(|s| {
            s.parse()
                .map_err(|_| Error::Parse(format!("invalid {keyword} entry '{s}'")))
        })
        .collect()
}

fn parse_single<T: std::str::FromStr>(keyword: &str, parts: &[&str]) -> Result<T> {
    let raw = parts
        .first()
        .ok_or_else(|| Error::Parse(format!("{keyword} has no value")))?;
    raw.parse()
        .map_err(|_| Error::Parse(format!("invalid {keyword} value '{raw}'")))
}

/// Read the header, leaving `reader` positioned at the first data byte.
pub fn read_pcd_header<R: BufRead>(reader: &mut R) -> Result<PcdHeader> {
    let mut header = PcdHeader {
        version: "0.7".to_string(),
        fields: Vec::new(),
        sizes: Vec::new(),
        types: Vec::new(),
        counts: Vec::new(),
        width: 0,
        height: 1,
        viewpoint: [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0],
        points: 0,
        data: PcdData::Ascii,
    };
    let mut points_given = false;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(Error::Parse("Unexpected EOF in header".to_string()));
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        let values = &parts[1..];
        match parts[0] {
            "VERSION" => {
                header.version = values.first().unwrap_or(&"0.7").to_string();
            }
            "FIELDS" => {
                header.fields = values.iter().map(|s| s.to_string()).collect();
            }
            "SIZE" => header.sizes = parse_list("SIZE", values)?,
            "TYPE" => {
                header.types = values.iter().filter_map(|s| s.chars().next()).collect();
            }
            "COUNT" => header.counts = parse_list("COUNT", values)?,
            "WIDTH" => header.width = parse_single("WIDTH", values)?,
            "HEIGHT" => header.height = parse_single("HEIGHT", values)?,
            "VIEWPOINT" => {
                let vp: Vec<f32> = parse_list("VIEWPOINT", values)?;
                if vp.len() != 7 {
                    return Err(Error::Parse(format!(
                        "VIEWPOINT expects 7 values, got {}",
                        vp.len()
                    )));
                }
                header.viewpoint.copy_from_slice(&vp);
            }
            "POINTS" => {
                header.points = parse_single("POINTS", values)?;
                points_given = true;
            }
            "DATA" => {
                header.data = match values.first().copied() {
                    Some("ascii") => PcdData::Ascii,
                    Some("binary") => PcdData::Binary,
                    Some("binary_compressed") => PcdData::BinaryCompressed,
                    other => {
                        return Err(Error::Parse(format!(
                            "unknown DATA type {}",
                            other.unwrap_or("<none>")
                        )))
                    }
                };
                break;
            }
            other => {
                tracing::debug!("ignoring unknown PCD header entry {other}");
            }
        }
    }

    if header.counts.is_empty() {
        header.counts = vec![1; header.fields.len()];
    }
    if !points_given {
        header.points = header
            .width
            .checked_mul(header.height)
            .ok_or_else(|| Error::Parse(format!("WIDTH {} x HEIGHT {} overflows", header.width, header.height)))?;
    }
    header.validate()?;
    Ok(header)
}

/// Read a PCD stream into a cloud of `P` records.
pub fn read_pcd<P: PointRecord, R: BufRead>(mut reader: R) -> Result<PointCloud<P>> {
    let header = read_pcd_header(&mut reader)?;
    let values = match header.data {
        PcdData::Ascii => parse_pcd_ascii(reader, &header)?,
        PcdData::Binary => parse_pcd_binary(reader, &header)?,
        PcdData::BinaryCompressed => {
            return Err(Error::UnsupportedFormat(
                "binary_compressed PCD is not supported".to_string(),
            ))
        }
    };

    let columns = header.fields.len();
    let mut points = Vec::with_capacity(values.len() / columns);
    for record in values.chunks_exact(columns) {
        let lookup = |name: &str| header.field_index(name).map(|i| record[i]);
        let point = P::from_fields(lookup)
            .ok_or_else(|| Error::Parse("record is missing x/y/z".to_string()))?;
        points.push(point);
    }
    Ok(PointCloud::new(points))
}

/// Decode ASCII records, keeping the first element of every field.
fn parse_pcd_ascii<R: BufRead>(reader: R, header: &PcdHeader) -> Result<Vec<f32>> {
    let columns = header.ascii_columns();
    let offsets: Vec<usize> = header
        .counts
        .iter()
        .scan(0, |acc, &c| {
            let start = *acc;
            *acc += c;
            Some(start)
        })
        .collect();

    let mut values = Vec::new();
    let mut read = 0;

    for (line_no, line) in reader.lines().enumerate() {
        if read == header.points {
            break;
        }
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < columns {
            return Err(Error::Parse(format!(
                "data line {} has {} values, expected {}",
                line_no + 1,
                tokens.len(),
                columns
            )));
        }
        for &offset in &offsets {
            let token = tokens[offset];
            let value: f32 = token.parse().map_err(|_| {
                Error::Parse(format!("invalid value '{token}' on data line {}", line_no + 1))
            })?;
            values.push(value);
        }
        read += 1;
    }

    if read < header.points {
        return Err(Error::Parse(format!(
            "expected {} points, found {}",
            header.points, read
        )));
    }
    Ok(values)
}

fn decode_scalar(bytes: &[u8], ty: char, size: usize) -> f32 {
    let mut buf = [0u8; 8];
    buf[..size].copy_from_slice(&bytes[..size]);
    match (ty, size) {
        ('F', 4) => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
        ('F', 8) => f64::from_le_bytes(buf) as f32,
        ('I', 1) => bytes[0] as i8 as f32,
        ('I', 2) => i16::from_le_bytes([buf[0], buf[1]]) as f32,
        ('I', 4) => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f32,
        ('I', 8) => i64::from_le_bytes(buf) as f32,
        ('U', 1) => bytes[0] as f32,
        ('U', 2) => u16::from_le_bytes([buf[0], buf[1]]) as f32,
        ('U', 4) => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f32,
        // validate() restricts the remaining combination to U8
        _ => u64::from_le_bytes(buf) as f32,
    }
}

/// Decode little-endian binary records, keeping the first element of every field.
fn parse_pcd_binary<R: Read>(mut reader: R, header: &PcdHeader) -> Result<Vec<f32>> {
    let step = header.point_step();
    let len = step
        .checked_mul(header.points)
        .ok_or_else(|| Error::Parse(format!("POINTS {} overflows the payload size", header.points)))?;
    // Sized by what the stream holds, not by the header.
    let mut payload = Vec::new();
    reader.by_ref().take(len as u64).read_to_end(&mut payload)?;
    if payload.len() < len {
        return Err(Error::Parse(format!(
            "binary payload truncated: {} of {} bytes ({} points of {} bytes)",
            payload.len(),
            len,
            header.points,
            step
        )));
    }

    let mut offsets = Vec::with_capacity(header.fields.len());
    let mut offset = 0;
    for (size, count) in header.sizes.iter().zip(&header.counts) {
        offsets.push(offset);
        offset += size * count;
    }

    let mut values = Vec::with_capacity(header.points * header.fields.len());
    for record in payload.chunks_exact(step) {
        for ((&start, &size), &ty) in offsets.iter().zip(&header.sizes).zip(&header.types) {
            values.push(decode_scalar(&record[start..start + size], ty, size));
        }
    }
    Ok(values)
}

/// Write point cloud to PCD format. Every field is stored as `F 4`.
pub fn write_pcd<P: PointRecord, W: Write>(
    writer: &mut W,
    cloud: &PointCloud<P>,
    data: PcdData,
) -> Result<()> {
    let data_keyword = match data {
        PcdData::Ascii => "ascii",
        PcdData::Binary => "binary",
        PcdData::BinaryCompressed => {
            return Err(Error::UnsupportedFormat(
                "writing binary_compressed PCD is not supported".to_string(),
            ))
        }
    };
    let num_points = cloud.len();
    let n_fields = P::FIELDS.len();

    writeln!(writer, "# .PCD v0.7 - Point Cloud Data file format")?;
    writeln!(writer, "VERSION 0.7")?;
    writeln!(writer, "FIELDS {}", P::FIELDS.join(" "))?;
    writeln!(writer, "SIZE {}", vec!["4"; n_fields].join(" "))?;
    writeln!(writer, "TYPE {}", vec!["F"; n_fields].join(" "))?;
    writeln!(writer, "COUNT {}", vec!["1"; n_fields].join(" "))?;
    writeln!(writer, "WIDTH {}", num_points)?;
    writeln!(writer, "HEIGHT 1")?;
    writeln!(writer, "VIEWPOINT 0 0 0 1 0 0 0")?;
    writeln!(writer, "POINTS {}", num_points)?;
    writeln!(writer, "DATA {}", data_keyword)?;

    let mut values = Vec::with_capacity(n_fields);
    for point in &cloud.points {
        values.clear();
        point.push_fields(&mut values);
        match data {
            PcdData::Binary => {
                for v in &values {
                    writer.write_all(&v.to_le_bytes())?;
                }
            }
            _ => {
                let line: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                writeln!(writer, "{}", line.join(" "))?;
            }
        }
    }

    Ok(())
}

/// Load a PCD file. Every failure is reported as [`Error::Load`] naming the path.
pub fn load_pcd<P: PointRecord>(path: impl AsRef<Path>) -> Result<PointCloud<P>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::load(path, e))?;
    let cloud = read_pcd(BufReader::new(file)).map_err(|e| Error::load(path, e))?;
    tracing::debug!("loaded {} points from {}", cloud.len(), path.display());
    Ok(cloud)
}

pub fn save_pcd<P: PointRecord>(
    path: impl AsRef<Path>,
    cloud: &PointCloud<P>,
    data: PcdData,
) -> Result<()> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    write_pcd(&mut writer, cloud, data)?;
    writer.flush()?;
    tracing::debug!("saved {} points to {}", cloud.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::{PointCloudXYZ, PointNormal, PointXYZ, PointXYZI};
    use nalgebra::{Point3, Vector3};
    use std::io::Cursor;

    fn sample_cloud() -> PointCloudXYZ {
        PointCloudXYZ::from_positions([
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.5, -2.25, 3.125),
            Point3::new(0.1, 0.2, 0.3),
        ])
    }

    #[test]
    fn test_ascii_round_trip() {
        let cloud = sample_cloud();
        let mut buf = Vec::new();
        write_pcd(&mut buf, &cloud, PcdData::Ascii).unwrap();
        let loaded: PointCloudXYZ = read_pcd(Cursor::new(buf)).unwrap();
        assert_eq!(loaded, cloud);
    }

    #[test]
    fn test_binary_round_trip() {
        let cloud: PointCloud<PointXYZI> = sample_cloud()
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| PointXYZI {
                position: p.position,
                intensity: i as f32 * 10.0,
            })
            .collect();
        let mut buf = Vec::new();
        write_pcd(&mut buf, &cloud, PcdData::Binary).unwrap();
        let loaded: PointCloud<PointXYZI> = read_pcd(Cursor::new(buf)).unwrap();
        assert_eq!(loaded, cloud);
    }

    #[test]
    fn test_read_reorders_fields_and_skips_counts() {
        let data = "\
# comment
VERSION .7
FIELDS z y x rgb
SIZE 4 4 4 4
TYPE F F F F
COUNT 1 1 1 1
WIDTH 2
HEIGHT 1
POINTS 2
DATA ascii
3 2 1 0
6 5 4 0
";
        let cloud: PointCloudXYZ = read_pcd(Cursor::new(data)).unwrap();
        assert_eq!(cloud.points[0], PointXYZ::new(1.0, 2.0, 3.0));
        assert_eq!(cloud.points[1], PointXYZ::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_binary_integer_fields() {
        let mut data = b"FIELDS x y z label\nSIZE 4 4 4 2\nTYPE F F F U\nWIDTH 1\nPOINTS 1\nDATA binary\n".to_vec();
        for v in [1.0f32, 2.0, 3.0] {
            data.extend_from_slice(&v.to_le_bytes());
        }
        data.extend_from_slice(&7u16.to_le_bytes());
        let cloud: PointCloudXYZ = read_pcd(Cursor::new(data)).unwrap();
        assert_eq!(cloud.points, vec![PointXYZ::new(1.0, 2.0, 3.0)]);
    }

    #[test]
    fn test_missing_optional_fields_default_to_zero() {
        let mut buf = Vec::new();
        write_pcd(&mut buf, &sample_cloud(), PcdData::Ascii).unwrap();
        let loaded: PointCloud<PointNormal> = read_pcd(Cursor::new(buf)).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.points[1].normal, Vector3::zeros());
    }

    #[test]
    fn test_malformed_inputs() {
        let truncated = "FIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nPOINTS 2\nDATA ascii\n1 2 3\n";
        assert!(matches!(
            read_pcd::<PointXYZ, _>(Cursor::new(truncated)),
            Err(Error::Parse(_))
        ));

        let no_z = "FIELDS x y\nSIZE 4 4\nTYPE F F\nPOINTS 1\nDATA ascii\n1 2\n";
        assert!(read_pcd::<PointXYZ, _>(Cursor::new(no_z)).is_err());

        let bad_value = "FIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nPOINTS 1\nDATA ascii\n1 two 3\n";
        assert!(read_pcd::<PointXYZ, _>(Cursor::new(bad_value)).is_err());

        let compressed = "FIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nPOINTS 1\nDATA binary_compressed\n";
        assert!(matches!(
            read_pcd::<PointXYZ, _>(Cursor::new(compressed)),
            Err(Error::UnsupportedFormat(_))
        ));

        assert!(read_pcd::<PointXYZ, _>(Cursor::new("VERSION 0.7\n")).is_err());
    }

    #[test]
    fn test_oversized_point_count_is_parse_error() {
        let header = |points: &str, data: &str| {
            format!("FIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nPOINTS {points}\nDATA {data}\n")
        };

        let overflow = header("18446744073709551615", "binary");
        assert!(matches!(
            read_pcd::<PointXYZ, _>(Cursor::new(overflow)),
            Err(Error::Parse(_))
        ));

        let mut huge = header("1000000000", "binary").into_bytes();
        for v in [1.0f32, 2.0, 3.0] {
            huge.extend_from_slice(&v.to_le_bytes());
        }
        assert!(matches!(
            read_pcd::<PointXYZ, _>(Cursor::new(huge)),
            Err(Error::Parse(_))
        ));

        let ascii = header("4611686018427387904", "ascii") + "1 2 3\n";
        assert!(matches!(
            read_pcd::<PointXYZ, _>(Cursor::new(ascii)),
            Err(Error::Parse(_))
        ));

        let wide = "FIELDS x y z\nSIZE 4 4 4\nTYPE F F F\nWIDTH 18446744073709551615\nHEIGHT 2\nDATA binary\n";
        assert!(matches!(
            read_pcd::<PointXYZ, _>(Cursor::new(wide)),
            Err(Error::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_load_error() {
        let err = load_pcd::<PointXYZ>("/nonexistent/cloud.pcd").unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.pcd");
        let cloud = sample_cloud();
        save_pcd(&path, &cloud, PcdData::Binary).unwrap();
        let loaded: PointCloudXYZ = load_pcd(&path).unwrap();
        assert_eq!(loaded, cloud);
    }
}
