//! Persisting detector results.
//!
//! Every non-scalar array is written to its own binary file: elements as
//! little-endian `f64`, in row-major order, with complex elements as
//! `(re, im)` pairs. Files are named `<DetectorName><FileTag>`, where the
//! tag is empty for the mean, `_2` for the second moment and `_<Name>` for
//! auxiliary arrays.
//!
//! Next to them goes `<DetectorName>.toml`, describing the detector's
//! configuration, its tally count, any scalar results, and the shape and
//! element type of each binary file.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};

use binrw::{BinRead, BinReaderExt, BinResult, BinWrite, BinWriterExt};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DetectorInput;
use crate::detector::Detector;
use crate::error::{Result, TallyError};
use crate::histogram::{Element, Histogram};
use crate::index::element_count;
use crate::tally::{Phase, Tally};

/// Elements that have a binary file representation
pub trait Storable: Element {
    /// Size of one element on disk, in bytes
    const BYTES: usize;

    fn write_to<W: Write + Seek>(&self, writer: &mut W) -> BinResult<()>;
    fn read_from<R: Read + Seek>(reader: &mut R) -> BinResult<Self>;

    fn array(histogram: &Histogram<Self>) -> ArrayRef<'_>;
    fn array_mut(histogram: &mut Histogram<Self>) -> ArrayMut<'_>;
}

impl Storable for f64 {
    const BYTES: usize = 8;
    fn write_to<W: Write + Seek>(&self, writer: &mut W) -> BinResult<()> { writer.write_le(self) }
    fn read_from<R: Read + Seek>(reader: &mut R) -> BinResult<Self> { reader.read_le() }
    fn array(h: &Histogram<Self>) -> ArrayRef<'_> { ArrayRef::Real(h) }
    fn array_mut(h: &mut Histogram<Self>) -> ArrayMut<'_> { ArrayMut::Real(h) }
}

#[derive(BinRead, BinWrite)]
#[brw(little)]
struct ComplexLe { re: f64, im: f64 }

impl Storable for Complex64 {
    const BYTES: usize = 16;
    fn write_to<W: Write + Seek>(&self, writer: &mut W) -> BinResult<()> {
        writer.write_le(&ComplexLe { re: self.re, im: self.im })
    }
    fn read_from<R: Read + Seek>(reader: &mut R) -> BinResult<Self> {
        let ComplexLe { re, im } = reader.read_le()?;
        Ok(Complex64::new(re, im))
    }
    fn array(h: &Histogram<Self>) -> ArrayRef<'_> { ArrayRef::Complex(h) }
    fn array_mut(h: &mut Histogram<Self>) -> ArrayMut<'_> { ArrayMut::Complex(h) }
}

pub fn write_array<E: Storable>(histogram: &Histogram<E>, path: &Path) -> Result<()> {
    let mut buf = BufWriter::new(File::create(path)?);
    for value in histogram.data() {
        value.write_to(&mut buf)?;
    }
    buf.flush()?;
    Ok(())
}

/// Read an array of known `shape`; the file must hold exactly that many
/// elements.
pub fn read_array<E: Storable>(path: &Path, shape: Vec<usize>) -> Result<Histogram<E>> {
    let file = File::open(path)?;
    let n = element_count(&shape);
    let bytes = file.metadata()?.len() as usize;
    if bytes != n * E::BYTES {
        return Err(TallyError::Shape {
            what: path.display().to_string(),
            expected: shape,
            actual: vec![bytes / E::BYTES],
        })
    }
    let mut buf = BufReader::new(file);
    let data = (0..n)
        .map(|_| E::read_from(&mut buf))
        .collect::<BinResult<Vec<_>>>()?;
    Histogram::from_data(shape, data)
}

// ----- Array references ---------------------------------------------------------------

#[derive(Clone, Copy, Debug)]
pub enum ArrayRef<'a> {
    Real(&'a Histogram<f64>),
    Complex(&'a Histogram<Complex64>),
}

impl<'a> ArrayRef<'a> {
    pub fn shape(&self) -> &'a [usize] {
        match *self {
            ArrayRef::Real(h)    => h.shape(),
            ArrayRef::Complex(h) => h.shape(),
        }
    }

    pub fn is_complex(&self) -> bool { matches!(self, ArrayRef::Complex(_)) }

    pub fn write(&self, path: &Path) -> Result<()> {
        match *self {
            ArrayRef::Real(h)    => write_array(h, path),
            ArrayRef::Complex(h) => write_array(h, path),
        }
    }
}

#[derive(Debug)]
pub enum ArrayMut<'a> {
    Real(&'a mut Histogram<f64>),
    Complex(&'a mut Histogram<Complex64>),
}

impl<'a> ArrayMut<'a> {
    pub fn shape(&self) -> &[usize] {
        match self {
            ArrayMut::Real(h)    => h.shape(),
            ArrayMut::Complex(h) => h.shape(),
        }
    }

    /// Replace the contents with those of the file at `path`, which must
    /// match this array's shape.
    pub fn read(&mut self, path: &Path) -> Result<()> {
        match self {
            ArrayMut::Real(h)    => **h = read_array(path, h.shape().to_vec())?,
            ArrayMut::Complex(h) => **h = read_array(path, h.shape().to_vec())?,
        }
        Ok(())
    }
}

/// One of a detector's arrays, with the information needed to store it
#[derive(Clone, Copy, Debug)]
pub struct BinaryArray<'a> {
    pub name: &'static str,
    pub file_tag: &'static str,
    pub data: ArrayRef<'a>,
}

impl<'a> BinaryArray<'a> {
    pub fn is_scalar(&self) -> bool { self.data.shape().is_empty() }

    pub fn file_name(&self, detector: &str) -> String { format!("{detector}{}", self.file_tag) }
}

#[derive(Debug)]
pub struct BinaryArrayMut<'a> {
    pub name: &'static str,
    pub file_tag: &'static str,
    pub data: ArrayMut<'a>,
}

impl<'a> BinaryArrayMut<'a> {
    /// Elementwise sum of `other` into this array
    pub fn merge(&mut self, other: &BinaryArray) -> Result<()> {
        match (&mut self.data, other.data) {
            (ArrayMut::Real   (mine), ArrayRef::Real   (theirs)) => mine.merge(theirs),
            (ArrayMut::Complex(mine), ArrayRef::Complex(theirs)) => mine.merge(theirs),
            _ => Err(TallyError::Incompatible {
                this: self.name.into(),
                other: format!("{} of different element type", other.name),
            }),
        }
    }
}

/// The principal array and second moment of `tally`, under their standard
/// names and tags.
pub fn tally_arrays<E: Storable>(tally: &Tally<E>) -> Vec<BinaryArray<'_>> {
    let mut arrays = vec![BinaryArray { name: "Mean", file_tag: "", data: E::array(tally.mean()) }];
    if let Some(sm) = tally.second_moment() {
        arrays.push(BinaryArray { name: "SecondMoment", file_tag: "_2", data: ArrayRef::Real(sm) });
    }
    arrays
}

/// Mutable counterpart of [`tally_arrays`]
pub fn tally_arrays_mut<E: Storable>(tally: &mut Tally<E>) -> Vec<BinaryArrayMut<'_>> {
    // Split the borrow: the mean and second moment are distinct fields
    let (mean, second_moment) = tally.arrays_mut();
    let mut arrays = vec![BinaryArrayMut { name: "Mean", file_tag: "", data: E::array_mut(mean) }];
    if let Some(sm) = second_moment {
        arrays.push(BinaryArrayMut { name: "SecondMoment", file_tag: "_2", data: ArrayMut::Real(sm) });
    }
    arrays
}

// ----- Metadata -----------------------------------------------------------------------

/// Where one array's binary file is, and how to interpret it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArrayRecord {
    pub name: String,
    pub file: String,
    pub complex: bool,
    pub shape: Vec<usize>,
}

/// Contents of `<DetectorName>.toml`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Metadata {
    pub name: String,
    pub tally_count: u64,
    pub phase: Phase,
    #[serde(default)]
    pub arrays: Vec<ArrayRecord>,
    /// Values of 0-dimensional arrays
    #[serde(default)]
    pub scalars: BTreeMap<String, f64>,
    pub input: DetectorInput,
}

impl Metadata {
    pub fn of<D: Detector + ?Sized>(detector: &D) -> Self {
        let name = detector.name();
        let mut arrays = vec![];
        let mut scalars = BTreeMap::new();
        for array in detector.arrays() {
            match array.data {
                ArrayRef::Real(h) if array.is_scalar() => {
                    scalars.insert(array.name.to_string(), h.data().first().copied().unwrap_or(0.0));
                }
                data => arrays.push(ArrayRecord {
                    name: array.name.into(),
                    file: array.file_name(name),
                    complex: data.is_complex(),
                    shape: data.shape().to_vec(),
                }),
            }
        }
        Self {
            name: name.into(),
            tally_count: detector.tally_count(),
            phase: detector.phase(),
            arrays,
            scalars,
            input: detector.input(),
        }
    }
}

fn metadata_path(dir: &Path, name: &str) -> PathBuf { dir.join(format!("{name}.toml")) }

/// Write `detector`'s metadata and binary arrays into `dir`, creating it if
/// necessary.
pub fn save(detector: &dyn Detector, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    let name = detector.name();
    for array in detector.serializers() {
        let path = dir.join(array.file_name(name));
        debug!(detector = name, array = array.name, path = %path.display(), "writing");
        array.data.write(&path)?;
    }
    let metadata = toml::to_string(&detector.metadata())?;
    fs::write(metadata_path(dir, name), metadata)?;
    info!(detector = name, dir = %dir.display(), "saved");
    Ok(())
}

/// Fill a freshly initialized `detector` with results previously saved in
/// `dir` (before normalization), so that more photons can be added to them.
///
/// `detector` must be initialized, not yet normalized, and still empty.
pub fn resume(detector: &mut dyn Detector, dir: &Path) -> Result<()> {
    let phase = detector.phase();
    if phase != Phase::Accumulating {
        return Err(TallyError::Phase { detector: detector.name().into(), operation: "resume", phase })
    }
    let metadata = read_metadata(dir, detector.name())?;
    let mismatch = |why: &str| TallyError::Incompatible {
        this: detector.name().into(),
        other: format!("{} ({why})", metadata_path(dir, &metadata.name).display()),
    };
    if metadata.input != detector.input()   { return Err(mismatch("different configuration")) }
    if detector.tally_count() != 0          { return Err(mismatch("detector already has tallies")) }
    if metadata.phase != Phase::Accumulating {
        return Err(TallyError::Phase { detector: metadata.name, operation: "be resumed", phase: metadata.phase })
    }
    {
        let mut arrays = detector.arrays_mut();
        for array in arrays.iter_mut() {
            if array.data.shape().is_empty() {
                let value = metadata.scalars.get(array.name).copied().unwrap_or(0.0);
                if let ArrayMut::Real(h) = &mut array.data {
                    if let Some(scalar) = h.data_mut().first_mut() { *scalar = value }
                }
            } else {
                array.data.read(&dir.join(format!("{}{}", metadata.name, array.file_tag)))?;
            }
        }
    }
    detector.add_tally_count(metadata.tally_count);
    info!(detector = %metadata.name, tally_count = metadata.tally_count, "resumed");
    Ok(())
}

/// A detector's results as read back from disk
#[derive(Clone, Debug, PartialEq)]
pub struct Results {
    pub metadata: Metadata,
    pub arrays: Vec<(String, LoadedArray)>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum LoadedArray {
    Real(Histogram<f64>),
    Complex(Histogram<Complex64>),
}

impl Results {
    pub fn get(&self, name: &str) -> Option<&LoadedArray> {
        self.arrays.iter().find(|(n, _)| n == name).map(|(_, a)| a)
    }
}

pub fn read_metadata(dir: &Path, name: &str) -> Result<Metadata> {
    let text = fs::read_to_string(metadata_path(dir, name))?;
    Ok(toml::from_str(&text)?)
}

/// Read the metadata and every binary array of the detector `name` saved in
/// `dir`.
pub fn read_results(dir: &Path, name: &str) -> Result<Results> {
    let metadata = read_metadata(dir, name)?;
    let arrays = metadata.arrays.iter()
        .map(|record| {
            let path = dir.join(&record.file);
            let shape = record.shape.clone();
            let array = if record.complex { LoadedArray::Complex(read_array(&path, shape)?) }
                        else              { LoadedArray::Real   (read_array(&path, shape)?) };
            Ok((record.name.clone(), array))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Results { metadata, arrays })
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};
    use rstest::rstest;
    use tempfile::tempdir;

    use crate::config::Config;
    use crate::detectors::testing::{exiting, rng, up, Slab};
    use crate::photon::Fate;
    use crate::weighting::AbsorptionWeighting;

    #[test]
    fn real_arrays_survive_a_round_trip_bit_for_bit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("real");
        let data = vec![0.1, -2.5e-300, f64::MIN_POSITIVE, 1.0 / 3.0, 7.0, 0.0];
        let h = Histogram::from_data(vec![2, 3], data.clone()).unwrap();
        write_array(&h, &path).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 6 * 8);
        let back: Histogram<f64> = read_array(&path, vec![2, 3]).unwrap();
        let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(back.data()), bits(&data));
    }

    #[test]
    fn complex_arrays_are_stored_as_pairs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("complex");
        let h = Histogram::from_data(vec![2], vec![Complex64::new(1.0, -2.0), Complex64::new(0.5, 0.25)]).unwrap();
        write_array(&h, &path).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[8..16], (-2.0_f64).to_le_bytes());

        let back: Histogram<Complex64> = read_array(&path, vec![2]).unwrap();
        assert_eq!(back, h);
    }

    #[rstest]
    #[case(vec![5])]
    #[case(vec![2, 2])]
    fn size_mismatch_is_a_shape_error(#[case] shape: Vec<usize>) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("three");
        write_array(&Histogram::from_data(vec![3], vec![1.0, 2.0, 3.0]).unwrap(), &path).unwrap();
        let result = read_array::<f64>(&path, shape);
        assert!(matches!(result, Err(TallyError::Shape { .. })), "{result:?}");
    }

    fn config() -> Config {
        toml::from_str(r#"
            [[detector]]
            type = "RDiffuse"
            second_moment = true
            [[detector]]
            type = "ROfRho"
            name = "reflectance"
            second_moment = true
            rho = { start = "0 mm", stop = "3 mm", bins = 3 }
            [[detector]]
            type = "ROfFx"
            fx = { start = 0.0, stop = 0.2, count = 3 }
        "#).unwrap()
    }

    fn filled(config: &Config) -> Vec<Box<dyn Detector>> {
        let tissue = Slab::new(AbsorptionWeighting::Discrete);
        let mut detectors = config.build().unwrap();
        for d in detectors.iter_mut() {
            d.initialize(&tissue).unwrap();
            for (x, w) in [(0.5, 0.25), (1.5, 0.5), (1.7, 0.125), (9.0, 1.0)] {
                d.tally(&exiting(Fate::ExitedTop, x, 0.0, w, 0.0, up()), &mut rng()).unwrap();
            }
        }
        detectors
    }

    #[test]
    fn saved_results_can_be_read_back() {
        let dir = tempdir().unwrap();
        let mut detectors = filled(&config());
        for d in detectors.iter_mut() {
            d.normalize(4).unwrap();
            save(d.as_ref(), dir.path()).unwrap();
        }

        // Scalars go into the metadata only
        let diffuse = read_results(dir.path(), "RDiffuse").unwrap();
        assert!(diffuse.arrays.is_empty());
        assert_eq!(diffuse.metadata.phase, Phase::Normalized);
        assert_float_eq!(diffuse.metadata.scalars["Mean"], 1.875 / 4.0, rmax <= 1e-12);
        assert!(!dir.path().join("RDiffuse").exists());

        let rho = read_results(dir.path(), "reflectance").unwrap();
        assert_eq!(rho.metadata.tally_count, 3);
        assert_eq!(rho.metadata.input, config().detectors[1]);
        let files: Vec<_> = rho.metadata.arrays.iter().map(|a| a.file.as_str()).collect();
        assert_eq!(files, ["reflectance", "reflectance_2"]);
        let Some(LoadedArray::Real(mean)) = rho.get("Mean") else { panic!("no real mean") };
        let ArrayRef::Real(original) = detectors[1].arrays()[0].data else { panic!("not real") };
        assert_eq!(mean, original);

        let fx = read_results(dir.path(), "ROfFx").unwrap();
        assert!(matches!(fx.get("Mean"), Some(LoadedArray::Complex(h)) if h.shape() == [3]));
        assert!(fx.get("SecondMoment").is_none());
    }

    #[test]
    fn resumed_detector_continues_where_it_stopped() {
        let dir = tempdir().unwrap();
        for d in filled(&config()) { save(d.as_ref(), dir.path()).unwrap() }

        let tissue = Slab::new(AbsorptionWeighting::Discrete);
        let mut resumed = config().build().unwrap();
        for d in resumed.iter_mut() {
            d.initialize(&tissue).unwrap();
            resume(d.as_mut(), dir.path()).unwrap();
        }
        for (r, f) in resumed.iter().zip(filled(&config())) {
            assert_eq!(r.metadata(), f.metadata());
            for (a, b) in r.arrays().iter().zip(f.arrays()) {
                match (a.data, b.data) {
                    (ArrayRef::Real   (a), ArrayRef::Real   (b)) => assert_eq!(a, b),
                    (ArrayRef::Complex(a), ArrayRef::Complex(b)) => assert_eq!(a, b),
                    _ => panic!("element types differ"),
                }
            }
        }
    }

    #[test]
    fn normalized_results_cannot_be_resumed() {
        let dir = tempdir().unwrap();
        let mut detectors = filled(&config());
        detectors[1].normalize(4).unwrap();
        save(detectors[1].as_ref(), dir.path()).unwrap();

        let mut fresh = config().detectors[1].build().unwrap();
        fresh.initialize(&Slab::new(AbsorptionWeighting::Discrete)).unwrap();
        let result = resume(fresh.as_mut(), dir.path());
        assert!(matches!(result, Err(TallyError::Phase { .. })), "{result:?}");
    }

    #[rstest]
    #[case::scalar(0)]
    #[case::array (1)]
    fn only_initialized_detectors_can_be_resumed(#[case] which: usize) {
        let dir = tempdir().unwrap();
        for d in filled(&config()) { save(d.as_ref(), dir.path()).unwrap() }

        let mut configured = config().detectors[which].build().unwrap();
        let result = resume(configured.as_mut(), dir.path());
        assert!(matches!(result, Err(TallyError::Phase { phase: Phase::Configured, .. })), "{result:?}");
        assert_eq!(configured.tally_count(), 0);
        assert_eq!(configured.phase(), Phase::Configured);
    }

    #[test]
    fn normalized_detector_is_not_overwritten_by_resume() {
        let dir = tempdir().unwrap();
        for d in filled(&config()) { save(d.as_ref(), dir.path()).unwrap() }

        let mut done = config().detectors[1].build().unwrap();
        done.initialize(&Slab::new(AbsorptionWeighting::Discrete)).unwrap();
        done.normalize(4).unwrap();
        let result = resume(done.as_mut(), dir.path());
        assert!(matches!(result, Err(TallyError::Phase { phase: Phase::Normalized, .. })), "{result:?}");
        assert_eq!(done.tally_count(), 0);
        let ArrayRef::Real(mean) = done.arrays()[0].data else { panic!("not real") };
        assert!(mean.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn resume_rejects_a_different_configuration() {
        let dir = tempdir().unwrap();
        let detectors = filled(&config());
        save(detectors[1].as_ref(), dir.path()).unwrap();

        let other: Config = toml::from_str(r#"
            [[detector]]
            type = "ROfRho"
            name = "reflectance"
            rho = { start = "0 mm", stop = "3 mm", bins = 6 }
        "#).unwrap();
        let mut fresh = other.detectors[0].build().unwrap();
        fresh.initialize(&Slab::new(AbsorptionWeighting::Discrete)).unwrap();
        assert!(matches!(resume(fresh.as_mut(), dir.path()), Err(TallyError::Incompatible { .. })));
    }
}
