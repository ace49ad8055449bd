//! Fourier-space gridding accumulator.
//!
//! Each inserted image is zero-padded to `P = npad · size`, Fourier
//! transformed and added, voxel by voxel, into the nearest grid points of the
//! half-space volume `[P][P][P/2 + 1]` (indexed `[[iz, iy, ix]]`, `ix ≥ 0`).
//! A parallel weight volume of identical shape records how much data each
//! voxel received. `finish` divides one by the other and transforms back to
//! real space.

pub type FourierVolume = Array3<Complex32>;
pub type WeightVolume  = Array3<Weightf32>;

/// How insertions are weighted.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Weighting {
    /// Wiener-like regularizer: `finish` divides by `weight + 1/snr`
    pub snr: Option<Ratiof32>,
    /// Multiply data by the CTF and accumulate CTF² as weight
    pub ctf: bool,
    pub sign: CtfSign,
    pub smear: Option<Smear>,
}

/// Everything needed to build an accumulator. Immutable once validated.
#[derive(Debug, Clone, PartialEq)]
pub struct Params {
    pub size: usize,
    pub npad: usize,
    pub symmetry: Symmetry,
    pub weighting: Weighting,
}

impl Params {

    /// `size`, no CTF, no regularization, identity symmetry, padding 2.
    pub fn new(size: usize) -> Self {
        Self { size, npad: 2, symmetry: Symmetry::identity(), weighting: Weighting::default() }
    }

    pub fn with_npad(self, npad: usize) -> Self { Self { npad, ..self } }

    pub fn with_symmetry(self, symmetry: &str) -> Result<Self> {
        Ok(Self { symmetry: Symmetry::parse(symmetry)?, ..self })
    }

    pub fn with_weighting(self, weighting: Weighting) -> Self { Self { weighting, ..self } }

    pub fn validate(&self) -> Result<()> {
        let bad = |m: String| Err(Error::InvalidConfiguration(m));
        if self.size == 0 { return bad("size must be positive".into()) }
        if self.npad == 0 { return bad("pad factor must be at least 1".into()) }
        if let Some(snr) = self.weighting.snr {
            if !(snr.is_finite() && snr > 0.0) { return bad(format!("snr must be positive and finite, got {snr}")) }
        }
        if let Some(smear) = self.weighting.smear {
            if !radian_(smear.step).is_finite() { return bad("smear step must be finite".into()) }
        }
        Ok(())
    }

    /// Side of the padded Fourier grid
    pub fn padded(&self) -> usize { self.size * self.npad }

    /// Largest frequency inserted, and extent of the x axis minus one
    pub fn half(&self) -> usize { self.padded() / 2 }

    pub fn volume_shape(&self) -> (usize, usize, usize) {
        let p = self.padded();
        (p, p, self.half() + 1)
    }
}

pub struct Accumulator {
    params: Params,
    inserter: SliceInserter,
    fourier: FourierVolume,
    weight: WeightVolume,
    n_images: usize,
    fft: Fft2d,
    ctf_cache: Option<(CtfDescriptor, CtfMap)>,
}

impl std::fmt::Debug for Accumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Accumulator")
            .field("params", &self.params)
            .field("shape", &self.fourier.dim())
            .field("n_images", &self.n_images)
            .finish()
    }
}

impl Clone for Accumulator {
    fn clone(&self) -> Self {
        Self {
            params: self.params.clone(),
            inserter: self.inserter.clone(),
            fourier: self.fourier.clone(),
            weight: self.weight.clone(),
            n_images: self.n_images,
            fft: Fft2d::new(self.params.padded()),
            ctf_cache: self.ctf_cache.clone(),
        }
    }
}

impl Accumulator {

    pub fn new(params: &Params) -> Result<Self> {
        params.validate()?;
        let shape = params.volume_shape();
        debug!("New accumulator: size {}, npad {}, symmetry {}, volume {:?}",
               params.size, params.npad, params.symmetry.group(), shape);
        Ok(Self {
            params: params.clone(),
            inserter: SliceInserter::new(params.symmetry.clone(), params.weighting.smear),
            fourier: FourierVolume::zeros(shape),
            weight: WeightVolume::zeros(shape),
            n_images: 0,
            fft: Fft2d::new(params.padded()),
            ctf_cache: None,
        })
    }

    /// Rebuild from transported volumes, which must match `params`.
    pub fn from_parts(params: &Params, fourier: FourierVolume, weight: WeightVolume, n_images: usize) -> Result<Self> {
        let mut acc = Self::new(params)?;
        let shape = params.volume_shape();
        if fourier.dim() != shape || weight.dim() != shape {
            return Err(Error::CollectiveProtocol(format!(
                "volumes of shape {:?} / {:?} do not match expected {shape:?}", fourier.dim(), weight.dim())));
        }
        acc.fourier = fourier;
        acc.weight = weight;
        acc.n_images = n_images;
        Ok(acc)
    }

    pub fn into_parts(self) -> (FourierVolume, WeightVolume, usize) { (self.fourier, self.weight, self.n_images) }

    pub fn params  (&self) -> &Params        { &self.params }
    pub fn fourier (&self) -> &FourierVolume { &self.fourier }
    pub fn weight  (&self) -> &WeightVolume  { &self.weight }
    pub fn n_images(&self) -> usize          { self.n_images }

    /// Insert `image` with an explicit orientation and weight, expanded over
    /// the symmetry group (and smear kernel). Errors refer to the image by
    /// its position among the images this accumulator has seen.
    pub fn insert(&mut self, image: &OrientedImage, transform: &Transform, weight: Weightf32) -> Result<()> {
        self.insert_indexed(self.n_images, image, transform, weight)
    }

    /// Insert using the image's own transform and weight.
    pub fn insert_image(&mut self, image: &OrientedImage) -> Result<()> {
        self.insert(image, &image.transform, image.weight)
    }

    /// `insert`, with `index` (the image's global position) used in errors.
    pub fn insert_indexed(&mut self, index: usize, image: &OrientedImage, transform: &Transform, weight: Weightf32) -> Result<()> {
        self.check(index, image, transform, weight)?;
        let insertions = self.inserter.expand(transform, weight);
        let ctf = self.cached_ctf_map(index, image)?;
        self.splat_all(image, transform, &insertions, ctf.as_ref())
    }

    /// Exactly one grid insertion with the given rotation: no symmetry
    /// expansion, no smearing. The image transform supplies only the shift.
    pub fn insert_rotated(&mut self, image: &OrientedImage, rotation: &Rotation, weight: Weightf32) -> Result<()> {
        let index = self.n_images;
        self.check(index, image, &image.transform, weight)?;
        if !rotation.is_proper(ROTATION_TOLERANCE) {
            return Err(Error::InvalidImage { index, reason: "rotation is not a finite proper rotation".into() });
        }
        let ctf = self.cached_ctf_map(index, image)?;
        self.splat_all(image, &image.transform, &[Insertion { rotation: *rotation, weight }], ctf.as_ref())
    }

    /// `insert_indexed` with a CTF map supplied (and possibly cached) by the
    /// caller instead of one derived from the image's descriptor. The image
    /// must still carry a descriptor, which supplies the `applied` flag.
    pub fn insert_with_ctf_map(&mut self, index: usize, image: &OrientedImage, transform: &Transform, weight: Weightf32, map: &CtfMap) -> Result<()> {
        if !self.params.weighting.ctf {
            return Err(Error::InvalidConfiguration("CTF map supplied but CTF weighting is disabled".into()));
        }
        self.check(index, image, transform, weight)?;
        let desc = image.ctf.ok_or(Error::MissingCtf { index })?;
        if map.padded() != self.params.padded() {
            return Err(Error::InvalidImage { index, reason: format!(
                "CTF map for a {} grid used with a {} grid", map.padded(), self.params.padded()) });
        }
        let insertions = self.inserter.expand(transform, weight);
        self.splat_all(image, transform, &insertions, Some(&(map.clone(), desc.applied)))
    }

    /// Drain an image source, inserting every image with its own transform
    /// and weight.
    pub fn accumulate<'a, S>(&mut self, source: S) -> Result<usize>
    where
        S: IntoIterator<Item = Result<Indexed<'a>>>,
    {
        let inserter = self.inserter.clone();
        let mut count = 0;
        for item in SymmetryExpanded::new(source.into_iter(), &inserter) {
            let Expanded { index, image, insertions } = item?;
            self.insert_expanded(index, &image, &insertions)?;
            count += 1;
        }
        debug!("Accumulated {count} images");
        Ok(count)
    }

    /// Insert an image whose grid insertions have already been worked out.
    pub fn insert_expanded(&mut self, index: usize, image: &OrientedImage, insertions: &[Insertion]) -> Result<()> {
        self.check(index, image, &image.transform, image.weight)?;
        let ctf = self.cached_ctf_map(index, image)?;
        self.splat_all(image, &image.transform, insertions, ctf.as_ref())
    }

    /// Add another accumulator's volumes into this one.
    pub fn merge(&mut self, other: &Accumulator) -> Result<()> {
        if other.fourier.dim() != self.fourier.dim() {
            return Err(Error::CollectiveProtocol(format!(
                "cannot merge volumes of shape {:?} into {:?}", other.fourier.dim(), self.fourier.dim())));
        }
        self.fourier += &other.fourier;
        self.weight  += &other.weight;
        self.n_images += other.n_images;
        Ok(())
    }

    fn check(&self, index: usize, image: &OrientedImage, transform: &Transform, weight: Weightf32) -> Result<()> {
        image.validate(index, self.params.size)?;
        if !transform.is_finite() {
            return Err(Error::InvalidImage { index, reason: "non-finite orientation or shift".into() });
        }
        if !weight.is_finite() {
            return Err(Error::InvalidImage { index, reason: "non-finite weight".into() });
        }
        Ok(())
    }

    /// The CTF map (and `applied` flag) for this image, reusing the previous
    /// map when consecutive images share a descriptor.
    fn cached_ctf_map(&mut self, index: usize, image: &OrientedImage) -> Result<Option<(CtfMap, bool)>> {
        if !self.params.weighting.ctf { return Ok(None) }
        let desc = image.ctf.ok_or(Error::MissingCtf { index })?;
        desc.validate().map_err(|e| Error::InvalidImage { index, reason: e.to_string() })?;
        match &self.ctf_cache {
            Some((cached, map)) if *cached == desc => Ok(Some((map.clone(), desc.applied))),
            _ => {
                let map = ctf_map(&desc, self.params.padded());
                self.ctf_cache = Some((desc, map.clone()));
                Ok(Some((map, desc.applied)))
            },
        }
    }

    fn splat_all(&mut self, image: &OrientedImage, transform: &Transform, insertions: &[Insertion], ctf: Option<&(CtfMap, bool)>) -> Result<()> {
        let slice = prepare_slice(&mut self.fft, image, transform);
        let p = self.params.padded();
        let grid = Grid { padded: p, half: p / 2, npad: self.params.npad };
        let ctf = ctf.map(|(map, applied)| CtfTerm {
            map,
            sign: self.params.weighting.sign.factor(),
            applied: *applied,
            noise: image.noise.as_deref(),
        });
        for insertion in insertions {
            splat(&mut self.fourier, &mut self.weight, &grid, &slice, insertion, ctf.as_ref());
        }
        self.n_images += 1;
        Ok(())
    }

    /// Normalize by the accumulated weights and return the real-space volume.
    ///
    /// Consumes the accumulator. If `compensate`, the result is divided by the
    /// Fourier transform of the nearest-neighbour gridding kernel.
    pub fn finish(self, compensate: bool) -> Volume {
        let Accumulator { params, mut fourier, mut weight, n_images, .. } = self;
        let (p, h, n) = (params.padded(), params.half(), params.size);
        info!("Finishing reconstruction of {} images on a {p}^3 grid", n_images);

        symmetrize_plane(&mut fourier, &mut weight, 0, p);
        if p % 2 == 0 && h > 0 { symmetrize_plane(&mut fourier, &mut weight, h, p); }

        // ----- divide by weights --------------------------------------------------
        let max_weight = weight.iter().fold(0.0_f32, |m, &w| m.max(w));
        let floor = WEIGHT_FLOOR * max_weight;
        let regularizer = params.weighting.snr.map_or(0.0, |snr| 1.0 / snr);
        par_azip!((f in &mut fourier, &w in &weight) {
            *f = if w > floor && w > 0.0 { *f / (w + regularizer) } else { Complex32::zero() };
        });

        // ----- expand to full Hermitian volume and invert -------------------------
        let dims = [p; 3];
        let mut full = vec![Complex32::zero(); p * p * p];
        full.par_iter_mut().enumerate().for_each(|(i, c)| {
            let [ix, iy, iz] = index1_to_3(i, dims);
            *c = if ix <= h {
                fourier[[iz, iy, ix]]
            } else {
                fourier[[(p - iz) % p, (p - iy) % p, p - ix]].conj()
            };
        });
        Fft3d::cube(p).inverse(&mut full);

        // ----- crop around the origin ----------------------------------------------
        let centre = (n / 2) as i32;
        let kernel = |d: i32| if compensate { sinc(PI * d as f32 / p as f32) } else { 1.0 };
        Volume::from_fn(n, |[x, y, z]| {
            let (dx, dy, dz) = (x as i32 - centre, y as i32 - centre, z as i32 - centre);
            let value = full[index3_to_1([wrap(dx, p), wrap(dy, p), wrap(dz, p)], dims)].re;
            value / (kernel(dx) * kernel(dy) * kernel(dz))
        })
    }
}

/// Weights at or below this fraction of the largest weight count as unsampled.
pub const WEIGHT_FLOOR: f32 = 1e-6;

/// Largest deviation from orthonormality accepted for an explicit rotation
pub const ROTATION_TOLERANCE: f32 = 1e-4;

struct Grid { padded: usize, half: usize, npad: usize }

struct CtfTerm<'a> {
    map: &'a CtfMap,
    sign: f32,
    applied: bool,
    noise: Option<&'a NoiseSpectrum>,
}

/// Zero-pad `image` to the padded grid with its centre at the origin, Fourier
/// transform it, and undo the transform's in-plane shift.
fn prepare_slice(fft: &mut Fft2d, image: &OrientedImage, transform: &Transform) -> Vec<Complex32> {
    let (p, n) = (fft.size(), image.size);
    let half_n = (n / 2) as i32;
    let mut slice = vec![Complex32::zero(); p * p];
    for iy in 0..n {
        let row = wrap(iy as i32 - half_n, p) * p;
        for ix in 0..n {
            slice[row + wrap(ix as i32 - half_n, p)] = Complex32::new(image.pixel(ix, iy), 0.0);
        }
    }
    fft.forward(&mut slice);

    let (sx, sy) = (transform.sx, transform.sy);
    if sx != 0.0 || sy != 0.0 {
        for (i, c) in slice.iter_mut().enumerate() {
            let kx = signed(i % p, p) as f32;
            let ky = signed(i / p, p) as f32;
            *c *= Complex32::from_polar(1.0, TAU * (kx * sx + ky * sy) / p as f32);
        }
    }
    slice
}

/// Nearest integer, exact halves truncated toward zero.
#[inline]
fn nearest(v: f32) -> i32 {
    let f = v.trunc();
    let d = v - f;
    (if d.abs() > 0.5 { f + d.signum() } else { f }) as i32
}

fn splat(fourier: &mut FourierVolume, weight: &mut WeightVolume, grid: &Grid, slice: &[Complex32], insertion: &Insertion, ctf: Option<&CtfTerm>) {
    let Grid { padded: p, half: h, npad } = *grid;
    let h = h as i32;
    let radius2 = h * h;
    let w = insertion.weight;
    for ky in -h..=h {
        // (0, -ky) is the Hermitian mate of (0, ky)
        let first_kx = if ky < 0 { 1 } else { 0 };
        for kx in first_kx..=h {
            let r2 = kx * kx + ky * ky;
            if r2 >= radius2 { continue }
            let mut value = slice[kx as usize + wrap(ky, p) * p];

            let (data_factor, weight_factor) = match ctf {
                None => (w, w),
                Some(CtfTerm { map, sign, applied, noise }) => {
                    let c = map.get(kx as usize, ky);
                    let inv_var = noise.map_or(1.0, |n| n.inverse_variance((r2 as f32).sqrt(), npad));
                    let data = if *applied { *sign } else { sign * c };
                    (data * w * inv_var, c * c * w * inv_var)
                },
            };

            let [mut x, mut y, mut z] = insertion.rotation.slice_point(kx as f32, ky as f32);
            if x < 0.0 {
                x = -x; y = -y; z = -z;
                value = value.conj();
            }
            let ix = nearest(x);
            if ix > h { continue }
            let i3 = [wrap(nearest(z), p), wrap(nearest(y), p), ix as usize];
            fourier[i3] += value * data_factor;
            weight [i3] += weight_factor;
        }
    }
}

/// Pool each voxel of the x-plane `ix` with its Hermitian mate `(-iy, -iz)`
/// in the same plane, so that both hold consistent data before division.
fn symmetrize_plane(fourier: &mut FourierVolume, weight: &mut WeightVolume, ix: usize, p: usize) {
    for iz in 0..p {
        for iy in 0..p {
            let (mz, my) = ((p - iz) % p, (p - iy) % p);
            match (iz, iy).cmp(&(mz, my)) {
                Ordering::Greater => continue,
                Ordering::Equal => {
                    let f = fourier[[iz, iy, ix]];
                    fourier[[iz, iy, ix]] = Complex32::new(2.0 * f.re, 0.0);
                    weight [[iz, iy, ix]] *= 2.0;
                },
                Ordering::Less => {
                    let pooled = fourier[[iz, iy, ix]] + fourier[[mz, my, ix]].conj();
                    let w = weight[[iz, iy, ix]] + weight[[mz, my, ix]];
                    fourier[[iz, iy, ix]] = pooled;
                    fourier[[mz, my, ix]] = pooled.conj();
                    weight [[iz, iy, ix]] = w;
                    weight [[mz, my, ix]] = w;
                },
            }
        }
    }
}

fn sinc(x: f32) -> f32 { if x == 0.0 { 1.0 } else { x.sin() / x } }

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use rstest::rstest;
    use crate::synthetic::{delta_projection, gaussian_projection};
    use geometry::Matrix3;

    fn unpadded(size: usize) -> Params { Params::new(size).with_npad(1) }

    #[rstest(/**/ params                                                         , ok,
             case(Params::new(8)                                                 , true ),
             case(Params::new(0)                                                 , false),
             case(Params::new(8).with_npad(0)                                    , false),
             case(Params::new(8).with_weighting(Weighting { snr: Some(0.0), ..Weighting::default() }), false),
             case(Params::new(8).with_weighting(Weighting { snr: Some(f32::NAN), ..Weighting::default() }), false),
             case(Params::new(8).with_weighting(Weighting { snr: Some(2.0), ..Weighting::default() }), true),
    )]
    fn configuration_is_validated_at_construction(params: Params, ok: bool) {
        let result = Accumulator::new(&params);
        assert_eq!(result.is_ok(), ok);
        if !ok { assert!(matches!(result, Err(Error::InvalidConfiguration(_)))) }
    }

    #[rstest(/**/ size, npad, shape,
             case(8, 2, (16, 16, 9)),
             case(7, 1, ( 7,  7, 4)),
             case(5, 3, (15, 15, 8)),
    )]
    fn half_space_shape(size: usize, npad: usize, shape: (usize, usize, usize)) {
        let acc = Accumulator::new(&Params::new(size).with_npad(npad)).unwrap();
        assert_eq!(acc.fourier().dim(), shape);
        assert_eq!(acc.weight ().dim(), shape);
    }

    #[rstest(/**/   v , n,
             case( 0.4, 0),
             case( 0.5, 0),
             case( 0.6, 1),
             case(-0.5, 0),
             case(-0.6,-1),
             case( 2.5, 2),
             case(-2.5,-2),
             case( 2.51, 3),
    )]
    fn nearest_grid_point_truncates_ties(v: f32, n: i32) {
        assert_eq!(nearest(v), n);
    }

    #[test]
    fn delta_at_centre_gives_flat_slice() {
        let mut fft = Fft2d::new(12);
        let image = delta_projection(6, Transform::identity());
        let slice = prepare_slice(&mut fft, &image, &Transform::identity());
        for c in slice {
            assert_float_eq!((c.re, c.im), (1.0, 0.0), abs <= (1e-6, 1e-6));
        }
    }

    #[test]
    fn shift_is_undone() {
        // A delta displaced by (2, -1) pixels, with the matching shift, must
        // transform like a centred delta.
        let n = 8;
        let mut image = OrientedImage::zeros(n, Transform::identity());
        image.data[(n/2 + 2) + (n/2 - 1) * n] = 1.0;
        let t = Transform::identity().with_shift(2.0, -1.0);
        let slice = prepare_slice(&mut Fft2d::new(16), &image, &t);
        for c in slice {
            assert_float_eq!((c.re, c.im), (1.0, 0.0), abs <= (1e-5, 1e-5));
        }
    }

    #[test]
    fn unit_weights_count_insertions() {
        let params = unpadded(8);
        let mut acc = Accumulator::new(&params).unwrap();
        let image = delta_projection(8, Transform::identity());
        for _ in 0..3 { acc.insert_image(&image).unwrap(); }
        assert_eq!(acc.n_images(), 3);
        // Identity orientation fills the kz = 0 plane
        assert_float_eq!(acc.weight()[[0, 1, 2]], 3.0, ulps <= 1);
        assert_float_eq!(acc.weight()[[1, 1, 2]], 0.0, ulps <= 1);
        assert_float_eq!(acc.fourier()[[0, 1, 2]].re, 3.0, abs <= 1e-5);
    }

    #[test]
    fn c1_matches_unexpanded_insertion() {
        let params = Params::new(10).with_symmetry("c1").unwrap();
        let mut expanded = Accumulator::new(&params).unwrap();
        let mut single   = Accumulator::new(&params).unwrap();
        for (k, (phi, theta, psi)) in [(10.0, 20.0, 30.0), (200.0, 95.0, -40.0), (0.0, 170.0, 1.0)].into_iter().enumerate() {
            let t = Transform::from_degrees(phi, theta, psi).with_shift(0.5, -1.0);
            let image = gaussian_projection(10, t, [1.0, -2.0, 0.5], 1.5).with_weight(1.0 + k as f32);
            expanded.insert_image(&image).unwrap();
            single.insert_rotated(&image, &t.rotation(), image.weight).unwrap();
        }
        assert_eq!(expanded.fourier(), single.fourier());
        assert_eq!(expanded.weight (), single.weight ());
    }

    #[test]
    fn symmetry_multiplies_grid_insertions() {
        let params = Params::new(8).with_symmetry("d2").unwrap();
        let mut acc = Accumulator::new(&params).unwrap();
        acc.insert_image(&delta_projection(8, Transform::from_degrees(30.0, 60.0, 0.0))).unwrap();
        let total: f32 = acc.weight().sum();

        let mut plain = Accumulator::new(&Params::new(8)).unwrap();
        plain.insert_image(&delta_projection(8, Transform::from_degrees(30.0, 60.0, 0.0))).unwrap();
        assert_float_eq!(total, 4.0 * plain.weight().sum(), r2nd <= 1e-6);
    }

    #[test]
    fn missing_ctf_is_reported_with_index() {
        let params = Params::new(8).with_weighting(Weighting { ctf: true, ..Weighting::default() });
        let mut acc = Accumulator::new(&params).unwrap();
        let image = delta_projection(8, Transform::identity());
        let err = acc.insert_indexed(5, &image, &image.transform, 1.0).unwrap_err();
        assert!(matches!(err, Error::MissingCtf { index: 5 }));
    }

    #[test]
    fn wrong_image_size_is_invalid() {
        let mut acc = Accumulator::new(&Params::new(8)).unwrap();
        let image = delta_projection(6, Transform::identity());
        assert!(matches!(acc.insert_image(&image), Err(Error::InvalidImage { index: 0, .. })));
    }

    #[test]
    fn merge_adds_volumes() {
        let params = Params::new(6);
        let image = delta_projection(6, Transform::from_degrees(0.0, 45.0, 0.0));
        let mut a = Accumulator::new(&params).unwrap();
        let mut b = Accumulator::new(&params).unwrap();
        a.insert_image(&image).unwrap();
        b.insert_image(&image).unwrap();
        b.insert_image(&image).unwrap();
        let mut both = Accumulator::new(&params).unwrap();
        for _ in 0..3 { both.insert_image(&image).unwrap(); }
        a.merge(&b).unwrap();
        assert_eq!(a.n_images(), 3);
        assert_eq!(a.weight(), both.weight());
        assert!(a.merge(&Accumulator::new(&Params::new(7)).unwrap()).is_err());
    }

    #[test]
    fn parts_roundtrip_checks_shape() {
        let params = Params::new(6);
        let (f, w, n) = Accumulator::new(&params).unwrap().into_parts();
        assert!(Accumulator::from_parts(&params, f.clone(), w.clone(), n).is_ok());
        assert!(Accumulator::from_parts(&Params::new(8), f, w, n).is_err());
    }

    #[test]
    fn empty_accumulator_finishes_to_zeros() {
        let volume = Accumulator::new(&Params::new(6)).unwrap().finish(true);
        assert_eq!(volume, Volume::zeros(6));
    }

    #[test]
    fn plane_symmetrization_pools_mates() {
        let params = unpadded(4);
        let acc = Accumulator::new(&params).unwrap();
        let (mut f, mut w, _) = acc.into_parts();
        f[[0, 1, 0]] = Complex32::new(1.0, 2.0);
        w[[0, 1, 0]] = 1.0;
        f[[0, 0, 0]] = Complex32::new(3.0, 1.0);
        w[[0, 0, 0]] = 1.0;
        symmetrize_plane(&mut f, &mut w, 0, 4);
        assert_eq!(f[[0, 1, 0]], Complex32::new(1.0,  2.0));
        assert_eq!(f[[0, 3, 0]], Complex32::new(1.0, -2.0));
        assert_eq!(w[[0, 3, 0]], 1.0);
        assert_eq!(f[[0, 0, 0]], Complex32::new(6.0, 0.0));
        assert_eq!(w[[0, 0, 0]], 2.0);
    }

    #[test]
    fn zero_ctf_except_dc_stays_finite() {
        use units::{angstrom, kv, mm, ratio, um};
        let desc = CtfDescriptor::new(um(1.0), kv(300.0), mm(2.7), angstrom(1.0), ratio(0.1));
        let params = Params::new(8).with_weighting(Weighting { snr: Some(1.0), ctf: true, ..Weighting::default() });
        let mut acc = Accumulator::new(&params).unwrap();
        let image = gaussian_projection(8, Transform::identity(), [0.0; 3], 1.0).with_ctf(desc);
        let map = CtfMap::from_fn(params.padded(), |kx, ky| if kx == 0 && ky == 0 { 1.0 } else { 0.0 });
        acc.insert_with_ctf_map(0, &image, &image.transform, 1.0, &map).unwrap();
        let volume = acc.finish(true);
        assert!(volume.is_finite());
    }

    #[rstest(/**/ rotation,
             case(Rotation::from_euler_radians(f32::NAN, 0.0, 0.0)),
             case(Rotation::from_matrix(Matrix3::identity() * 2.0)),
             case(Rotation::from_matrix(-Matrix3::identity())),
    )]
    fn improper_rotation_is_rejected(rotation: Rotation) {
        let mut acc = Accumulator::new(&Params::new(8)).unwrap();
        let image = delta_projection(8, Transform::identity());
        let result = acc.insert_rotated(&image, &rotation, 1.0);
        assert!(matches!(result, Err(Error::InvalidImage { index: 0, .. })));
        assert_eq!(acc.n_images(), 0);
        assert_eq!(acc.weight().sum(), 0.0);
    }

    #[test]
    fn ctf_map_insertion_needs_a_descriptor() {
        let params = Params::new(8).with_weighting(Weighting { ctf: true, ..Weighting::default() });
        let mut acc = Accumulator::new(&params).unwrap();
        let image = delta_projection(8, Transform::identity());
        let map = CtfMap::from_fn(params.padded(), |_, _| 1.0);
        let err = acc.insert_with_ctf_map(1, &image, &image.transform, 1.0, &map).unwrap_err();
        assert!(matches!(err, Error::MissingCtf { index: 1 }));
        assert_eq!(acc.n_images(), 0);
    }

    #[test]
    fn ctf_map_insertion_needs_ctf_weighting() {
        use units::{angstrom, kv, mm, ratio, um};
        let desc = CtfDescriptor::new(um(1.0), kv(300.0), mm(2.7), angstrom(1.0), ratio(0.1));
        let params = Params::new(8);
        let mut acc = Accumulator::new(&params).unwrap();
        let image = delta_projection(8, Transform::identity()).with_ctf(desc);
        let map = CtfMap::from_fn(params.padded(), |_, _| 1.0);
        let result = acc.insert_with_ctf_map(0, &image, &image.transform, 1.0, &map);
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn kx_zero_column_is_inserted_once() {
        let mut acc = Accumulator::new(&unpadded(8)).unwrap();
        acc.insert_image(&delta_projection(8, Transform::identity())).unwrap();
        // (0, ky) and (0, -ky) are mates: only one of them receives data
        assert_eq!(acc.weight()[[0, 0, 0]], 1.0);
        assert_eq!(acc.weight()[[0, 1, 0]], 1.0);
        assert_eq!(acc.weight()[[0, 7, 0]], 0.0);
        assert_eq!(acc.weight()[[0, 7, 1]], 1.0);
    }

    #[test]
    fn kx_zero_plane_weights_match_the_rest_after_pooling() {
        let params = unpadded(8);
        let mut acc = Accumulator::new(&params).unwrap();
        acc.insert_image(&delta_projection(8, Transform::identity())).unwrap();
        let (mut f, mut w, _) = acc.into_parts();
        symmetrize_plane(&mut f, &mut w, 0, 8);
        assert_eq!(w[[0, 1, 0]], w[[0, 1, 1]]);
        assert_eq!(w[[0, 7, 0]], w[[0, 1, 1]]);
    }
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::cmp::Ordering;
use std::f32::consts::{PI, TAU};

use ndarray::{par_azip, Array3};
use num_complex::Complex32;
use num_traits::Zero;
use rayon::prelude::*;
use tracing::{debug, info};

use geometry::{Rotation, Transform};
use units::{radian_, todo::{Ratiof32, Weightf32}};

use crate::{
    ctf::{ctf_map, CtfDescriptor, CtfMap, CtfSign, NoiseSpectrum},
    error::{Error, Result},
    fft::{Fft2d, Fft3d},
    image::OrientedImage,
    index::{index1_to_3, index3_to_1, signed, wrap},
    inserter::{Insertion, SliceInserter, Smear},
    source::{Expanded, Indexed, SymmetryExpanded},
    symmetry::Symmetry,
    volume::Volume,
};
