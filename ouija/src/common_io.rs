//! Line and dense-matrix IO, gzip-aware by file extension.

use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Buffered reader over a plain or `.gz` file.
pub fn open_buf_reader(input_file: &str) -> Result<Box<dyn BufRead>> {
    let ext = Path::new(input_file).extension().and_then(|x| x.to_str());
    match ext {
        Some("gz") => {
            let input_file = File::open(input_file)?;
            Ok(Box::new(BufReader::new(GzDecoder::new(input_file))))
        }
        _ => {
            let input_file = File::open(input_file)?;
            Ok(Box::new(BufReader::new(input_file)))
        }
    }
}

/// Buffered writer to a plain or `.gz` file; `"stdout"` writes to the
/// terminal instead.
pub fn open_buf_writer(output_file: &str) -> Result<Box<dyn Write>> {
    if output_file.eq_ignore_ascii_case("stdout") {
        return Ok(Box::new(BufWriter::new(std::io::stdout())));
    }

    let ext = Path::new(output_file).extension().and_then(|x| x.to_str());
    match ext {
        Some("gz") => {
            let output_file = File::create(output_file)?;
            let encoder = GzEncoder::new(output_file, flate2::Compression::default());
            Ok(Box::new(BufWriter::new(encoder)))
        }
        _ => {
            let output_file = File::create(output_file)?;
            Ok(Box::new(BufWriter::new(output_file)))
        }
    }
}

pub fn read_lines(input_file: &str) -> Result<Vec<Box<str>>> {
    let buf = open_buf_reader(input_file)?;
    let mut lines = vec![];
    for line in buf.lines() {
        lines.push(line?.into_boxed_str());
    }
    Ok(lines)
}

pub fn write_lines(lines: &[Box<str>], output_file: &str) -> Result<()> {
    let mut buf = open_buf_writer(output_file)?;
    for line in lines {
        if let Err(e) = writeln!(buf, "{}", line) {
            if e.kind() == std::io::ErrorKind::BrokenPipe {
                return Ok(());
            }
            return Err(anyhow!("unexpected write error: {}", e));
        }
    }
    buf.flush()?;
    Ok(())
}

/// Read a dense whitespace- or tab-separated numeric matrix into an
/// `(n rows, n cols)` f32 tensor. Lines starting with `#` or `%` are
/// treated as comments.
pub fn read_dense_tsv(input_file: &str, device: &Device) -> Result<Tensor> {
    let buf = open_buf_reader(input_file)?;

    let mut data: Vec<f32> = vec![];
    let mut ncols = 0usize;
    let mut nrows = 0usize;

    for (lnum, line) in buf.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') || line.starts_with('%') {
            continue;
        }
        let mut width = 0usize;
        for field in line.split_whitespace() {
            let value: f32 = field
                .parse()
                .map_err(|_| anyhow!("bad value '{}' at line {}", field, lnum + 1))?;
            data.push(value);
            width += 1;
        }
        if nrows == 0 {
            ncols = width;
        } else if width != ncols {
            return Err(anyhow!(
                "ragged matrix: line {} has {} fields, expected {}",
                lnum + 1,
                width,
                ncols
            ));
        }
        nrows += 1;
    }

    if nrows == 0 {
        return Err(anyhow!("no data in {}", input_file));
    }
    Ok(Tensor::from_vec(data, (nrows, ncols), device)?)
}

/// Write a rank-2 f32 tensor as a tab-separated matrix.
pub fn write_dense_tsv(matrix: &Tensor, output_file: &str) -> Result<()> {
    let rows = matrix.to_vec2::<f32>()?;
    let lines: Vec<Box<str>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join("\t")
                .into_boxed_str()
        })
        .collect();
    write_lines(&lines, output_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_round_trip_plain_and_gz() {
        let dir = tempfile::tempdir().unwrap();
        let lines: Vec<Box<str>> = vec!["alpha\t1".into(), "beta\t2".into()];
        for name in ["lines.tsv", "lines.tsv.gz"] {
            let path = dir.path().join(name);
            let path = path.to_str().unwrap();
            write_lines(&lines, path).unwrap();
            assert_eq!(read_lines(path).unwrap(), lines);
        }
    }

    #[test]
    fn dense_matrix_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let dev = Device::Cpu;
        let mat =
            Tensor::from_vec(vec![0f32, 1.5, -2.25, 3.0, 0.0, 9.125], (2, 3), &dev).unwrap();
        for name in ["mat.tsv", "mat.tsv.gz"] {
            let path = dir.path().join(name);
            let path = path.to_str().unwrap();
            write_dense_tsv(&mat, path).unwrap();
            let back = read_dense_tsv(path, &dev).unwrap();
            assert_eq!(back.dims(), &[2, 3]);
            assert_eq!(
                back.flatten_all().unwrap().to_vec1::<f32>().unwrap(),
                mat.flatten_all().unwrap().to_vec1::<f32>().unwrap()
            );
        }
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mat.tsv");
        let path = path.to_str().unwrap();
        let lines: Vec<Box<str>> = vec![
            "# header comment".into(),
            "1\t2".into(),
            "".into(),
            "% another".into(),
            "3\t4".into(),
        ];
        write_lines(&lines, path).unwrap();
        let mat = read_dense_tsv(path, &Device::Cpu).unwrap();
        assert_eq!(mat.dims(), &[2, 2]);
    }

    #[test]
    fn ragged_and_malformed_input_fail() {
        let dir = tempfile::tempdir().unwrap();

        let ragged = dir.path().join("ragged.tsv");
        let bad_shape: Vec<Box<str>> = vec!["1\t2".into(), "3".into()];
        write_lines(&bad_shape, ragged.to_str().unwrap()).unwrap();
        assert!(read_dense_tsv(ragged.to_str().unwrap(), &Device::Cpu).is_err());

        let garbled = dir.path().join("garbled.tsv");
        let bad_value: Vec<Box<str>> = vec!["1\tnope".into()];
        write_lines(&bad_value, garbled.to_str().unwrap()).unwrap();
        let err = read_dense_tsv(garbled.to_str().unwrap(), &Device::Cpu);
        assert!(err.unwrap_err().to_string().contains("line 1"));
    }
}
