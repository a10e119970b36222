//! Point clouds and the PCD reader
//!
//! Supports the subset of the Point Cloud Data format that cameras produce:
//! `x y z` with an optional packed `rgb` field, stored as `ascii` or `binary`.

use crate::error::{CameraError, Result};

/// A single point, in metres, with optional colour
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub color: Option<[u8; 3]>,
}

/// Collection of points returned by a camera
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    points: Vec<Point>,
}

impl PointCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, point: Point) {
        self.points.push(point);
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether any point carries colour
    pub fn has_color(&self) -> bool {
        self.points.iter().any(|p| p.color.is_some())
    }

    /// Axis-aligned bounds as `(min, max)` corners
    pub fn bounds(&self) -> Option<([f64; 3], [f64; 3])> {
        let first = self.points.first()?;
        let mut min = [first.x, first.y, first.z];
        let mut max = min;
        for p in &self.points[1..] {
            for (i, v) in [p.x, p.y, p.z].into_iter().enumerate() {
                min[i] = min[i].min(v);
                max[i] = max[i].max(v);
            }
        }
        Some((min, max))
    }
}

#[derive(Debug, Clone)]
struct Field {
    name: String,
    size: usize,
    kind: char,
}

#[derive(Debug, PartialEq)]
enum DataKind {
    Ascii,
    Binary,
}

fn malformed(msg: impl Into<String>) -> CameraError {
    CameraError::MalformedPayload(format!("pcd: {}", msg.into()))
}

/// Parse PCD bytes into a [`PointCloud`]
pub fn read_pcd(bytes: &[u8]) -> Result<PointCloud> {
    let mut names: Vec<String> = Vec::new();
    let mut sizes: Vec<usize> = Vec::new();
    let mut kinds: Vec<char> = Vec::new();
    let mut points: Option<usize> = None;
    let mut width: Option<usize> = None;
    let mut height: Option<usize> = None;
    let mut data: Option<DataKind> = None;

    let mut offset = 0;
    while data.is_none() {
        if offset >= bytes.len() {
            return Err(malformed("header ended before DATA"));
        }
        let end = bytes[offset..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| offset + i)
            .unwrap_or(bytes.len());
        let line = std::str::from_utf8(&bytes[offset..end])
            .map_err(|_| malformed("header is not UTF-8"))?
            .trim();
        offset = (end + 1).min(bytes.len());

        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut tokens = line.split_whitespace();
        let key = tokens.next().unwrap_or_default().to_ascii_uppercase();
        let values: Vec<&str> = tokens.collect();
        match key.as_str() {
            "VERSION" | "VIEWPOINT" => {}
            "FIELDS" => names = values.iter().map(|v| v.to_string()).collect(),
            "SIZE" => sizes = parse_all(&values, "SIZE")?,
            "TYPE" => {
                kinds = values
                    .iter()
                    .map(|v| v.chars().next().unwrap_or('?').to_ascii_uppercase())
                    .collect()
            }
            "COUNT" => {
                let counts: Vec<usize> = parse_all(&values, "COUNT")?;
                if counts.iter().any(|&c| c != 1) {
                    return Err(malformed("only COUNT 1 fields are supported"));
                }
            }
            "WIDTH" => width = parse_all::<usize>(&values, "WIDTH")?.first().copied(),
            "HEIGHT" => height = parse_all::<usize>(&values, "HEIGHT")?.first().copied(),
            "POINTS" => points = parse_all::<usize>(&values, "POINTS")?.first().copied(),
            "DATA" => {
                data = match values.first().map(|v| v.to_ascii_lowercase()).as_deref() {
                    Some("ascii") => Some(DataKind::Ascii),
                    Some("binary") => Some(DataKind::Binary),
                    other => {
                        return Err(malformed(format!("unsupported DATA {:?}", other)));
                    }
                }
            }
            other => return Err(malformed(format!("unknown header key {}", other))),
        }
    }

    if names.is_empty() || names.len() != sizes.len() || names.len() != kinds.len() {
        return Err(malformed("FIELDS, SIZE and TYPE disagree"));
    }
    let fields: Vec<Field> = names
        .into_iter()
        .zip(sizes)
        .zip(kinds)
        .map(|((name, size), kind)| Field { name, size, kind })
        .collect();
    if let Some(field) = fields.iter().find(|f| !matches!(f.size, 1 | 2 | 4 | 8)) {
        return Err(malformed(format!(
            "field {} has unsupported SIZE {}",
            field.name, field.size
        )));
    }
    for axis in ["x", "y", "z"] {
        if !fields.iter().any(|f| f.name == axis) {
            return Err(malformed(format!("missing field {}", axis)));
        }
    }
    let count = match (points, width) {
        (Some(points), _) => points,
        (None, Some(width)) => width
            .checked_mul(height.unwrap_or(1))
            .ok_or_else(|| malformed("WIDTH * HEIGHT overflows"))?,
        (None, None) => return Err(malformed("missing POINTS")),
    };

    let body = &bytes[offset..];
    match data {
        Some(DataKind::Binary) => read_binary(body, &fields, count),
        _ => read_ascii(body, &fields, count),
    }
}

fn parse_all<T: std::str::FromStr>(values: &[&str], key: &str) -> Result<Vec<T>> {
    values
        .iter()
        .map(|v| v.parse().map_err(|_| malformed(format!("bad {} value {}", key, v))))
        .collect()
}

fn unpack_rgb(packed: u32) -> [u8; 3] {
    [(packed >> 16) as u8, (packed >> 8) as u8, packed as u8]
}

fn read_ascii(body: &[u8], fields: &[Field], count: usize) -> Result<PointCloud> {
    let text = std::str::from_utf8(body).map_err(|_| malformed("ascii data is not UTF-8"))?;
    let mut cloud = PointCloud::new();
    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != fields.len() {
            return Err(malformed(format!(
                "expected {} values per point, got {}",
                fields.len(),
                tokens.len()
            )));
        }
        let mut point = Point {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            color: None,
        };
        for (field, token) in fields.iter().zip(tokens) {
            match field.name.as_str() {
                "x" | "y" | "z" => {
                    let v: f64 = token
                        .parse()
                        .map_err(|_| malformed(format!("bad coordinate {}", token)))?;
                    set_axis(&mut point, &field.name, v);
                }
                "rgb" => {
                    let packed = if field.kind == 'F' {
                        token.parse::<f32>().map(f32::to_bits).ok()
                    } else {
                        token.parse::<u32>().ok()
                    }
                    .ok_or_else(|| malformed(format!("bad rgb {}", token)))?;
                    point.color = Some(unpack_rgb(packed));
                }
                _ => {}
            }
        }
        cloud.push(point);
    }
    if cloud.len() != count {
        return Err(malformed(format!(
            "header promised {} points, found {}",
            count,
            cloud.len()
        )));
    }
    Ok(cloud)
}

fn read_binary(body: &[u8], fields: &[Field], count: usize) -> Result<PointCloud> {
    let stride = fields
        .iter()
        .try_fold(0usize, |acc, f| acc.checked_add(f.size))
        .ok_or_else(|| malformed("record size overflows"))?;
    let needed = stride
        .checked_mul(count)
        .ok_or_else(|| malformed("point count overflows"))?;
    if stride == 0 || body.len() < needed {
        return Err(malformed(format!(
            "binary data needs {} bytes, got {}",
            needed,
            body.len()
        )));
    }

    let mut cloud = PointCloud::new();
    for record in body[..needed].chunks_exact(stride) {
        let mut point = Point {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            color: None,
        };
        let mut at = 0;
        for field in fields {
            let raw = &record[at..at + field.size];
            at += field.size;
            match (field.name.as_str(), field.kind, field.size) {
                ("x" | "y" | "z", 'F', 4) => {
                    let v = f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                    set_axis(&mut point, &field.name, f64::from(v));
                }
                ("x" | "y" | "z", 'F', 8) => {
                    let mut buf = [0u8; 8];
                    buf.copy_from_slice(raw);
                    set_axis(&mut point, &field.name, f64::from_le_bytes(buf));
                }
                ("x" | "y" | "z", kind, size) => {
                    return Err(malformed(format!(
                        "unsupported coordinate type {}{}",
                        kind, size
                    )));
                }
                ("rgb", _, 4) => {
                    let packed = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
                    point.color = Some(unpack_rgb(packed));
                }
                _ => {}
            }
        }
        cloud.push(point);
    }
    Ok(cloud)
}

fn set_axis(point: &mut Point, axis: &str, value: f64) {
    match axis {
        "x" => point.x = value,
        "y" => point.y = value,
        _ => point.z = value,
    }
}
