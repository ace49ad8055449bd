/// Read / write float arrays as raw little-endian binary

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

type IORes<T> = std::io::Result<T>;

const F32_BYTES: u64 = std::mem::size_of::<f32>() as u64;

pub fn write(data: impl Iterator<Item = f32>, path: &Path) -> IORes<()> {
    let mut buf = BufWriter::new(File::create(path)?);
    for datum in data {
        buf.write_all(&datum.to_le_bytes())?;
    }
    buf.flush()
}

/// Lazily stream every `f32` in the file.
pub fn read<'a>(path: &Path) -> IORes<impl Iterator<Item = IORes<f32>> + 'a> {
    let mut buf = BufReader::new(File::open(path)?);
    let mut buffer = [0; 4];

    Ok(std::iter::from_fn(move || {
        use std::io::ErrorKind::UnexpectedEof;
        match buf.read_exact(&mut buffer) {
            Ok(()) => Some(Ok(f32::from_le_bytes(buffer))),
            Err(e) if e.kind() == UnexpectedEof => None,
            Err(e) => Some(Err(e)),
        }
    }))
}

/// Number of `f32`s stored in the file.
pub fn count(path: &Path) -> IORes<usize> {
    Ok((std::fs::metadata(path)?.len() / F32_BYTES) as usize)
}

/// Read `count` values starting at value number `first`, seeking directly to
/// them; used to pull one image at a time out of a stack.
pub fn read_range(file: &mut File, first: usize, count: usize) -> IORes<Vec<f32>> {
    file.seek(SeekFrom::Start(first as u64 * F32_BYTES))?;
    let mut bytes = vec![0; count * F32_BYTES as usize];
    file.read_exact(&mut bytes)?;
    Ok(bytes
       .chunks_exact(F32_BYTES as usize)
       .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
       .collect())
}

#[cfg(test)]
mod test {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn raw_io_roundtrip() -> IORes<()> {
        // Harmless temporary location for output file
        let dir = tempfile::tempdir()?;
        let file_path = dir.path().join("test.bin");

        let original_data = vec![1.23, 4.56, 7.89];
        write(original_data.iter().copied(), &file_path)?;

        let reloaded_data: Vec<_> = read(&file_path)?
            .collect::<Result<_, _>>()?;

        assert_eq!(original_data, reloaded_data);
        assert_eq!(count(&file_path)?, 3);
        Ok(())
    }

    #[test]
    fn ranges_can_be_read_out_of_order() -> IORes<()> {
        let dir = tempfile::tempdir()?;
        let file_path = dir.path().join("stack.bin");
        write((0..12).map(|i| i as f32), &file_path)?;

        let mut file = File::open(&file_path)?;
        assert_eq!(read_range(&mut file, 8, 4)?, vec![8.0, 9.0, 10.0, 11.0]);
        assert_eq!(read_range(&mut file, 0, 2)?, vec![0.0, 1.0]);
        assert!(read_range(&mut file, 10, 4).is_err());
        Ok(())
    }
}
