//! Binary wavefunction snapshots.
//!
//! A snapshot is a fixed-size [`Header`] immediately followed by the raw
//! complex amplitudes of one internal state as little-endian `(re, im)` pairs
//! of `f64`, in flat grid order. Packed sequence files are append-only
//! concatenations of such frames.

use std::{
    fs,
    io::{ self, BufReader, BufWriter, Read, Write },
    path::{ Path, PathBuf },
};
use ndarray as nd;
use num_complex::Complex64 as C64;
use crate::{ error::SnapshotError, field::Field, grid::Header };

pub type SResult<T> = Result<T, SnapshotError>;

/// File name of a per-step snapshot of state `k` (zero-based) at time `t`.
pub fn snapshot_name(t: f64, k: usize) -> String { format!("{:.3}_{}.bin", t, k + 1) }

/// File name of the pre-scan checkpoint of state `k` (zero-based) for the
/// `segment`-th sequence.
pub fn backup_name(segment: usize, k: usize) -> String {
    format!("Backup_{}_{}.bin", segment, k + 1)
}

/// File name of the packed sequence file of state `k` (zero-based) for the
/// `segment`-th sequence.
pub fn packed_name(segment: usize, k: usize) -> String {
    format!("Seq_{}_{}.bin", segment, k + 1)
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> SnapshotError + '_ {
    move |source| SnapshotError::Io { path: path.to_path_buf(), source }
}

fn write_frame<W>(path: &Path, out: &mut W, field: &Field, k: usize) -> SResult<()>
where W: Write
{
    if k >= field.n_states() { return Err(SnapshotError::Component(k)); }
    bincode::serialize_into(&mut *out, field.header())
        .map_err(|source| {
            SnapshotError::Header { path: path.to_path_buf(), source }
        })?;
    for z in field.component(k).iter() {
        out.write_all(&z.re.to_le_bytes()).map_err(io_err(path))?;
        out.write_all(&z.im.to_le_bytes()).map_err(io_err(path))?;
    }
    out.flush().map_err(io_err(path))
}

/// Write state `k` of `field` to a new snapshot file, replacing any existing
/// file.
pub fn save<P>(path: P, field: &Field, k: usize) -> SResult<()>
where P: AsRef<Path>
{
    let path = path.as_ref();
    let file = fs::File::create(path).map_err(io_err(path))?;
    write_frame(path, &mut BufWriter::new(file), field, k)
}

/// Append state `k` of `field` as one frame to a packed sequence file,
/// creating it if necessary.
pub fn append<P>(path: P, field: &Field, k: usize) -> SResult<()>
where P: AsRef<Path>
{
    let path = path.as_ref();
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err(path))?;
    write_frame(path, &mut BufWriter::new(file), field, k)
}

/// Remove a file if it exists.
pub fn remove<P>(path: P) -> SResult<()>
where P: AsRef<Path>
{
    let path = path.as_ref();
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(path)(err)),
    }
}

/// Read the first frame of a snapshot file.
pub fn read<P>(path: P) -> SResult<(Header, nd::Array1<C64>)>
where P: AsRef<Path>
{
    let path = path.as_ref();
    let file = fs::File::open(path).map_err(io_err(path))?;
    let mut input = BufReader::new(file);
    let header: Header = bincode::deserialize_from(&mut input)
        .map_err(|source| {
            SnapshotError::Header { path: path.to_path_buf(), source }
        })?;
    let n = header.n_points();
    let mut bytes: Vec<u8> = vec![0; 16 * n];
    input.read_exact(&mut bytes).map_err(io_err(path))?;
    let mut re = [0_u8; 8];
    let mut im = [0_u8; 8];
    let data: nd::Array1<C64>
        = bytes.chunks_exact(16)
        .map(|pair| {
            re.copy_from_slice(&pair[..8]);
            im.copy_from_slice(&pair[8..]);
            C64::new(f64::from_le_bytes(re), f64::from_le_bytes(im))
        })
        .collect();
    Ok((header, data))
}

/// Overwrite state `k` of `field` with the payload of a snapshot file and
/// return the time stored in the file's header.
///
/// Fails if the file's grid differs from the field's in dimension or in the
/// number of points along any axis.
pub fn load<P>(path: P, field: &mut Field, k: usize) -> SResult<f64>
where P: AsRef<Path>
{
    let path = path.as_ref();
    if k >= field.n_states() { return Err(SnapshotError::Component(k)); }
    let (header, data) = read(path)?;
    let expected = active_shape(field.header());
    let found = active_shape(&header);
    if found != expected {
        return Err(SnapshotError::Grid {
            path: path.to_path_buf(),
            expected,
            found,
        });
    }
    field.assign_component(k, &data);
    Ok(header.t)
}

fn active_shape(header: &Header) -> Vec<usize> {
    header.shape()[..header.dim()].to_vec()
}

fn save_states<F>(dir: &Path, field: &Field, name: F) -> SResult<Vec<PathBuf>>
where F: Fn(usize) -> String
{
    (0..field.n_states())
        .map(|k| {
            let path = dir.join(name(k));
            save(&path, field, k).map(|_| path)
        })
        .collect()
}

/// Write every state of `field` to per-state snapshots in `dir`, named by the
/// field's current time.
pub fn save_all<P>(dir: P, field: &Field) -> SResult<Vec<PathBuf>>
where P: AsRef<Path>
{
    let t = field.t();
    save_states(dir.as_ref(), field, |k| snapshot_name(t, k))
}

/// Checkpoint every state of `field` under the `segment`-th sequence's
/// backup names, which no per-step snapshot can overwrite.
pub fn save_backup<P>(dir: P, field: &Field, segment: usize)
    -> SResult<Vec<PathBuf>>
where P: AsRef<Path>
{
    save_states(dir.as_ref(), field, |k| backup_name(segment, k))
}

/// Restore every state of `field` from the `segment`-th sequence's
/// checkpoint, along with the time it was taken at. Returns that time.
pub fn load_backup<P>(dir: P, field: &mut Field, segment: usize) -> SResult<f64>
where P: AsRef<Path>
{
    let mut t = field.t();
    for k in 0..field.n_states() {
        t = load(dir.as_ref().join(backup_name(segment, k)), field, k)?;
    }
    field.set_t(t);
    Ok(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> Field {
        let mut h = Header::new(1, &[8], &[-4.0], &[4.0], 0.001).unwrap();
        h.t = 1.25;
        let a: nd::Array1<C64>
            = (0..8).map(|l| C64::new(l as f64, -(l as f64) / 2.0)).collect();
        let b = a.mapv(|z| z * C64::i());
        Field::from_components(h, &[a, b]).unwrap()
    }

    #[test]
    fn names() {
        assert_eq!(snapshot_name(0.5, 0), "0.500_1.bin");
        assert_eq!(snapshot_name(2.0, 2), "2.000_3.bin");
        assert_eq!(packed_name(4, 1), "Seq_4_2.bin");
        assert_eq!(backup_name(2, 0), "Backup_2_1.bin");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let src = field();
        let path = dir.path().join("a.bin");
        save(&path, &src, 1).unwrap();
        let len = fs::metadata(&path).unwrap().len();
        assert_eq!(len, Header::encoded_len() + 16 * 8);

        let mut dst = Field::zeros(*src.header(), 2);
        let t = load(&path, &mut dst, 0).unwrap();
        assert_eq!(t, 1.25);
        assert_eq!(dst.component(0), src.component(1));
    }

    #[test]
    fn append_grows_by_frames() {
        let dir = tempfile::tempdir().unwrap();
        let src = field();
        let path = dir.path().join(packed_name(1, 0));
        append(&path, &src, 0).unwrap();
        append(&path, &src, 0).unwrap();
        let len = fs::metadata(&path).unwrap().len();
        assert_eq!(len, 2 * (Header::encoded_len() + 16 * 8));
        remove(&path).unwrap();
        assert!(!path.exists());
        remove(&path).unwrap();
    }

    #[test]
    fn load_rejects_other_grids() {
        let dir = tempfile::tempdir().unwrap();
        let src = field();
        let path = dir.path().join("a.bin");
        save(&path, &src, 0).unwrap();
        let h = Header::new(1, &[16], &[-4.0], &[4.0], 0.001).unwrap();
        let mut dst = Field::zeros(h, 1);
        assert!(matches!(
            load(&path, &mut dst, 0),
            Err(SnapshotError::Grid { expected, found, .. })
                if expected == vec![16] && found == vec![8]
        ));
    }

    #[test]
    fn load_rejects_reshaped_grids() {
        let dir = tempfile::tempdir().unwrap();
        let h = Header::new(2, &[4, 2], &[0.0; 2], &[1.0; 2], 0.001).unwrap();
        let path = dir.path().join("a.bin");
        save(&path, &Field::zeros(h, 1), 0).unwrap();

        let same_count
            = Header::new(2, &[2, 4], &[0.0; 2], &[1.0; 2], 0.001).unwrap();
        let mut dst = Field::zeros(same_count, 1);
        assert!(matches!(
            load(&path, &mut dst, 0),
            Err(SnapshotError::Grid { expected, found, .. })
                if expected == vec![2, 4] && found == vec![4, 2]
        ));
        let flat = Header::new(1, &[8], &[0.0], &[1.0], 0.001).unwrap();
        let mut dst = Field::zeros(flat, 1);
        assert!(matches!(
            load(&path, &mut dst, 0),
            Err(SnapshotError::Grid { .. }),
        ));
    }

    #[test]
    fn backup_restores_states_and_time() {
        let dir = tempfile::tempdir().unwrap();
        let src = field();
        let paths = save_backup(dir.path(), &src, 3).unwrap();
        assert!(paths[1].ends_with("Backup_3_2.bin"));
        // a per-step snapshot at a nearby time does not touch the checkpoint
        let mut later = src.clone();
        later.set_t(1.2501);
        later.psi_mut().fill(C64::new(9.0, 0.0));
        save_all(dir.path(), &later).unwrap();

        let mut dst = later.clone();
        let t = load_backup(dir.path(), &mut dst, 3).unwrap();
        assert_eq!(t, 1.25);
        assert_eq!(dst.t(), 1.25);
        assert_eq!(dst.psi(), src.psi());
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut dst = field();
        assert!(matches!(
            load(dir.path().join("nope.bin"), &mut dst, 0),
            Err(SnapshotError::Io { .. }),
        ));
    }
}
