//! STL reading, binary and ASCII.

use std::io::Read;
use std::path::Path;

use crate::error::{MeshError, Result};
use crate::{Facet, Normal, TriangleMesh, Vertex};

/// Size of one binary STL facet record: normal + three vertices + attribute.
const BINARY_FACET_SIZE: usize = 12 * 4 + 2;

/// Size of the binary STL prelude: 80-byte header + facet count.
const BINARY_HEADER_SIZE: usize = 80 + 4;

/// Read an STL file, auto-detecting the binary and ASCII variants.
///
/// The mesh is returned unrepaired; callers run
/// [`TriangleMesh::repair`] before slicing.
pub fn read_stl(path: &Path) -> Result<TriangleMesh> {
    let mut data = Vec::new();
    std::fs::File::open(path)?.read_to_end(&mut data)?;
    read_stl_bytes(&data)
}

/// Parse STL data from memory.
pub fn read_stl_bytes(data: &[u8]) -> Result<TriangleMesh> {
    if looks_ascii(data) {
        parse_ascii(data)
    } else {
        parse_binary(data)
    }
}

/// An ASCII STL starts with "solid" and mentions a facet soon after; binary
/// files may also start with "solid", so the keyword check matters.
fn looks_ascii(data: &[u8]) -> bool {
    let head = &data[..data.len().min(512)];
    let Ok(text) = std::str::from_utf8(head) else {
        return false;
    };
    text.trim_start().starts_with("solid") && text.contains("facet")
}

fn parse_binary(data: &[u8]) -> Result<TriangleMesh> {
    if data.len() < BINARY_HEADER_SIZE {
        return Err(MeshError::ReadError("file too short for binary STL".into()));
    }
    let count = u32::from_le_bytes([data[80], data[81], data[82], data[83]]) as usize;
    let expected = BINARY_HEADER_SIZE + count * BINARY_FACET_SIZE;
    if data.len() < expected {
        return Err(MeshError::ReadError(format!(
            "binary STL declares {} facets but holds only {} bytes",
            count,
            data.len()
        )));
    }

    let mut facets = Vec::with_capacity(count);
    let mut offset = BINARY_HEADER_SIZE;
    for _ in 0..count {
        let mut values = [0f32; 12];
        for value in &mut values {
            *value = f32::from_le_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ]);
            offset += 4;
        }
        offset += 2; // attribute byte count, ignored
        facets.push(Facet {
            normal: Normal::new(values[0], values[1], values[2]),
            vertices: [
                Vertex::new(values[3], values[4], values[5]),
                Vertex::new(values[6], values[7], values[8]),
                Vertex::new(values[9], values[10], values[11]),
            ],
        });
    }
    Ok(TriangleMesh::from_facets(facets))
}

fn parse_ascii(data: &[u8]) -> Result<TriangleMesh> {
    let text = std::str::from_utf8(data)
        .map_err(|_| MeshError::ReadError("ASCII STL is not valid UTF-8".into()))?;

    let mut facets = Vec::new();
    let mut normal = Normal::zeros();
    let mut vertices: Vec<Vertex> = Vec::with_capacity(3);

    for (line_no, line) in text.lines().enumerate() {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("facet") => {
                // facet normal nx ny nz
                let coords = parse_triplet(tokens.skip(1), line_no)?;
                normal = Normal::new(coords[0], coords[1], coords[2]);
                vertices.clear();
            }
            Some("vertex") => {
                let coords = parse_triplet(tokens, line_no)?;
                vertices.push(Vertex::new(coords[0], coords[1], coords[2]));
            }
            Some("endfacet") => {
                if vertices.len() != 3 {
                    return Err(MeshError::ReadError(format!(
                        "facet ending on line {} has {} vertices",
                        line_no + 1,
                        vertices.len()
                    )));
                }
                facets.push(Facet {
                    normal,
                    vertices: [vertices[0], vertices[1], vertices[2]],
                });
            }
            _ => {}
        }
    }
    Ok(TriangleMesh::from_facets(facets))
}

fn parse_triplet<'a>(
    tokens: impl Iterator<Item = &'a str>,
    line_no: usize,
) -> Result<[f32; 3]> {
    let mut out = [0f32; 3];
    let mut filled = 0;
    for token in tokens.take(3) {
        out[filled] = token
            .parse()
            .map_err(|_| MeshError::ReadError(format!("bad float on line {}", line_no + 1)))?;
        filled += 1;
    }
    if filled != 3 {
        return Err(MeshError::ReadError(format!(
            "expected three coordinates on line {}",
            line_no + 1
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ascii_tetrahedron() -> String {
        let mut s = String::from("solid tet\n");
        let faces = [
            [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
            [[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            [[0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]],
            [[1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]],
        ];
        for face in faces {
            s.push_str("facet normal 0 0 0\nouter loop\n");
            for v in face {
                s.push_str(&format!("vertex {} {} {}\n", v[0], v[1], v[2]));
            }
            s.push_str("endloop\nendfacet\n");
        }
        s.push_str("endsolid tet\n");
        s
    }

    fn binary_from(mesh: &TriangleMesh) -> Vec<u8> {
        let mut data = vec![0u8; 80];
        data.extend((mesh.facets_count() as u32).to_le_bytes());
        for facet in mesh.facets() {
            for c in [facet.normal.x, facet.normal.y, facet.normal.z] {
                data.extend(c.to_le_bytes());
            }
            for v in &facet.vertices {
                for c in [v.x, v.y, v.z] {
                    data.extend(c.to_le_bytes());
                }
            }
            data.extend([0u8, 0u8]);
        }
        data
    }

    #[test]
    fn test_parse_ascii() {
        let mesh = read_stl_bytes(ascii_tetrahedron().as_bytes()).unwrap();
        assert_eq!(mesh.facets_count(), 4);
    }

    #[test]
    fn test_parse_binary_round_trip() {
        let cube = TriangleMesh::make_cube(10.0, 10.0, 10.0);
        let data = binary_from(&cube);
        let mut parsed = read_stl_bytes(&data).unwrap();
        assert_eq!(parsed.facets_count(), 12);
        parsed.repair();
        assert!(parsed.is_manifold());
    }

    #[test]
    fn test_binary_truncated_fails() {
        let cube = TriangleMesh::make_cube(10.0, 10.0, 10.0);
        let mut data = binary_from(&cube);
        data.truncate(data.len() - 10);
        assert!(matches!(
            read_stl_bytes(&data),
            Err(MeshError::ReadError(_))
        ));
    }

    #[test]
    fn test_header_only_fails() {
        assert!(read_stl_bytes(&[0u8; 20]).is_err());
    }
}
