//! Image sources: anything that yields images tagged with their global
//! position in the dataset.
//!
//! Three adapters are provided: borrowed in-memory slices, a lazy reader of
//! raw image stacks, and a wrapper which annotates every image with its
//! symmetry-expanded insertion list.

/// An image and its position in the global image sequence.
#[derive(Debug, Clone)]
pub struct Indexed<'a> {
    pub index: usize,
    pub image: Cow<'a, OrientedImage>,
}

/// Borrow a slice of images whose first element has global index `first`.
pub fn in_memory(images: &[OrientedImage], first: usize) -> impl Iterator<Item = Result<Indexed<'_>>> + Clone {
    images.iter()
        .enumerate()
        .map(move |(i, image)| Ok(Indexed { index: first + i, image: Cow::Borrowed(image) }))
}

/// Images read one at a time from a headerless `f32` stack, with orientations
/// (and optionally defocus and group) from a text parameter file.
pub struct RawStack {
    path: PathBuf,
    file: File,
    size: usize,
    params: Vec<ProjectionParams>,
    optics: Option<CtfDescriptor>,
    next: usize,
    end: usize,
}

impl RawStack {

    /// `optics` supplies every CTF parameter except defocus, which comes from
    /// the parameter file. Images without a defocus get no CTF descriptor.
    pub fn open(stack: &Path, params: &Path, size: usize, optics: Option<CtfDescriptor>) -> Result<Self> {
        let params = read_projection_params(params)?;
        let available = raw::count(stack).map_err(Error::io(stack))?;
        let needed = params.len() * size * size;
        if available < needed {
            return Err(Error::InvalidConfiguration(format!(
                "stack {stack:?} holds {available} values; {} images of {size}x{size} need {needed}",
                params.len())));
        }
        let file = File::open(stack).map_err(Error::io(stack))?;
        let end = params.len();
        Ok(Self { path: stack.into(), file, size, params, optics, next: 0, end })
    }

    /// Total number of images in the stack, regardless of restriction.
    pub fn len(&self) -> usize { self.params.len() }

    pub fn is_empty(&self) -> bool { self.params.is_empty() }

    pub fn params(&self) -> &[ProjectionParams] { &self.params }

    /// Only yield images whose global index lies in `range`.
    pub fn restrict(mut self, range: Range<usize>) -> Self {
        self.end  = range.end.min(self.params.len());
        self.next = range.start.min(self.end);
        self
    }

    fn load(&mut self, index: usize) -> Result<OrientedImage> {
        let n = self.size;
        let data = raw::read_range(&mut self.file, index * n * n, n * n).map_err(Error::io(&self.path))?;
        let ProjectionParams { transform, defocus, group } = self.params[index];
        let mut image = OrientedImage::new(n, data, transform);
        image.group = group;
        // Without a defocus there is no usable descriptor
        image.ctf = match (self.optics, defocus) {
            (Some(optics), Some(defocus)) => Some(CtfDescriptor { defocus, ..optics }),
            _ => None,
        };
        Ok(image)
    }
}

impl Iterator for RawStack {
    type Item = Result<Indexed<'static>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end { return None }
        let index = self.next;
        self.next += 1;
        Some(self.load(index).map(|image| Indexed { index, image: Cow::Owned(image) }))
    }
}

/// An image together with every grid insertion it expands into.
#[derive(Debug, Clone)]
pub struct Expanded<'a> {
    pub index: usize,
    pub image: Cow<'a, OrientedImage>,
    pub insertions: Vec<Insertion>,
}

/// Wraps any image source, expanding each image over the inserter's symmetry
/// group and smear kernel.
pub struct SymmetryExpanded<'i, S> {
    source: S,
    inserter: &'i SliceInserter,
}

impl<'i, S> SymmetryExpanded<'i, S> {
    pub fn new(source: S, inserter: &'i SliceInserter) -> Self { Self { source, inserter } }
}

impl<'i, 'a, S> Iterator for SymmetryExpanded<'i, S>
where
    S: Iterator<Item = Result<Indexed<'a>>>,
{
    type Item = Result<Expanded<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.source.next().map(|item| item.map(|Indexed { index, image }| {
            let insertions = self.inserter.expand(&image.transform, image.weight);
            Expanded { index, image, insertions }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};
    use crate::symmetry::Symmetry;
    use geometry::Transform;

    fn images(n: usize) -> Vec<OrientedImage> {
        (0..n).map(|i| OrientedImage::zeros(2, Transform::from_degrees(i as f32, 0.0, 0.0))).collect()
    }

    #[test]
    fn in_memory_indices_are_global() {
        let images = images(3);
        let indices: Vec<usize> = in_memory(&images, 10).map(|r| r.unwrap().index).collect();
        assert_eq!(indices, vec![10, 11, 12]);
    }

    #[test]
    fn expansion_annotates_each_image() {
        let images = images(2);
        let inserter = SliceInserter::new(Symmetry::parse("c3").unwrap(), None);
        let expanded: Vec<_> = SymmetryExpanded::new(in_memory(&images, 0), &inserter)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(expanded.len(), 2);
        assert!(expanded.iter().all(|e| e.insertions.len() == 3));
        assert_eq!(expanded[1].insertions[0].rotation, images[1].transform.rotation());
    }

    fn write_stack(dir: &Path, n_images: usize, size: usize) -> (PathBuf, PathBuf) {
        let stack  = dir.join("stack.raw");
        let params = dir.join("stack.txt");
        raw::write((0..n_images * size * size).map(|i| i as f32), &stack).unwrap();
        let lines: Vec<String> = (0..n_images)
            .map(|i| format!("{} 10 20 0.5 -0.5 {} {}", 5 * i, 1.0 + i as f32, i % 2))
            .collect();
        std::fs::write(&params, lines.join("\n")).unwrap();
        (stack, params)
    }

    #[test]
    fn raw_stack_reads_lazily_and_restricts() -> Result<()> {
        use units::{angstrom, kv, mm, ratio, um, um_};
        let dir = tempfile::tempdir().map_err(Error::io("tempdir"))?;
        let (stack, params) = write_stack(dir.path(), 4, 3);
        let optics = CtfDescriptor::new(um(0.0), kv(300.0), mm(2.7), angstrom(1.2), ratio(0.1));

        let all = RawStack::open(&stack, &params, 3, Some(optics))?;
        assert_eq!(all.len(), 4);
        let images: Vec<Indexed> = all.restrict(1..3).collect::<Result<_>>()?;
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].index, 1);
        assert_eq!(images[0].image.data[0], 9.0);
        assert_eq!(images[1].image.group, Some(0));
        let ctf = images[1].image.ctf.unwrap();
        float_eq::assert_float_eq!(um_(ctf.defocus), 3.0, r2nd <= 1e-6);
        assert_eq!(ctf.voltage, kv(300.0));
        Ok(())
    }

    #[test]
    fn image_without_defocus_has_no_ctf() -> Result<()> {
        use units::{angstrom, kv, mm, ratio, um};
        let dir = tempfile::tempdir().map_err(Error::io("tempdir"))?;
        let (stack, params) = write_stack(dir.path(), 2, 3);
        std::fs::write(&params, "0 0 0 0 0 - 1\n0 0 0 0 0 2.0 1\n").map_err(Error::io(&params))?;
        let optics = CtfDescriptor::new(um(0.0), kv(300.0), mm(2.7), angstrom(1.2), ratio(0.1));
        let images: Vec<Indexed> = RawStack::open(&stack, &params, 3, Some(optics))?.collect::<Result<_>>()?;
        assert_eq!(images[0].image.ctf, None);
        assert!(images[1].image.ctf.is_some());
        Ok(())
    }

    #[test]
    fn short_stack_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (stack, params) = write_stack(dir.path(), 4, 3);
        assert!(matches!(RawStack::open(&stack, &params, 4, None), Err(Error::InvalidConfiguration(_))));
    }
}

// ----- Imports -----------------------------------------------------------------------------------------
use std::borrow::Cow;
use std::fs::File;
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::{
    ctf::CtfDescriptor,
    error::{Error, Result},
    image::OrientedImage,
    inserter::{Insertion, SliceInserter},
    io::raw,
    utils::{read_projection_params, ProjectionParams},
};
