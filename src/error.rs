use crate::signal::FilterBand;
use ndarray::ShapeError;
use nifti::error::NiftiError;
use quick_error::quick_error;
use std::io::Error as IOError;

quick_error! {
    /// Error type for all error variants originated by this crate.
    #[derive(Debug)]
    pub enum ContargError {
        /// Failure reading or writing a nifti file.
        Nifti(err: NiftiError) {
            from()
            source(err)
            display("Nifti error: {}", err)
        }

        /// I/O Error
        Io(err: IOError) {
            from()
            source(err)
            display("I/O error: {}", err)
        }

        /// Arrays that were combined do not have compatible shapes.
        Shape(err: ShapeError) {
            from()
            source(err)
            display("Shape error: {}", err)
        }

        Pattern(err: glob::PatternError) {
            from()
            source(err)
            display("Invalid glob pattern: {}", err)
        }

        /// A path matched by a glob pattern could not be read.
        Glob(err: glob::GlobError) {
            from()
            source(err)
            display("Cannot read {}: {}", err.path().display(), err.error())
        }

        /// An image is not defined on the grid of the whole-brain mask.
        GridMismatch(expected: Vec<usize>, found: Vec<usize>) {
            display("Image grid {:?} does not match mask grid {:?}", found, expected)
        }

        /// An image has the mask's shape but is placed differently in space.
        AffineMismatch(max_difference: f64) {
            display("Image affine differs from the mask affine by up to {}", max_difference)
        }

        InvalidDimensions(ndim: usize) {
            display("Expected a 3D or 4D image, got {}D", ndim)
        }

        EmptyMask {
            display("Whole-brain mask contains no voxels")
        }

        /// A region of interest has no voxels inside the whole-brain mask.
        EmptyRegion(name: &'static str) {
            display("The {} has no voxels inside the whole-brain mask", name)
        }

        NoRuns {
            display("At least one functional run is required")
        }

        InvalidRepetitionTime(tr: f64) {
            display("Repetition time must be a positive number of seconds, got {}", tr)
        }

        InvalidCutoff(cutoff: f64, nyquist: f64) {
            display("Cutoff {} Hz must lie between 0 Hz and the Nyquist frequency {} Hz", cutoff, nyquist)
        }

        InvalidBand(high_pass: f64, low_pass: f64) {
            display("High-pass cutoff {} Hz must be below low-pass cutoff {} Hz", high_pass, low_pass)
        }

        /// Filter edges given as fractions of Nyquist are outside (0, 1) or not increasing.
        InvalidFilterBand(band: FilterBand) {
            display("Filter band {:?} needs increasing edges strictly between 0 and 1 (Nyquist)", band)
        }

        TooFewTimepoints(available: usize, required: usize) {
            display("Run has {} timepoints, at least {} are required", available, required)
        }

        /// Seed-map weights outside the stimulus ROI sum to zero.
        ZeroWeightSum {
            display("Seed-map weights sum to zero after excluding the stimulus ROI")
        }

        ZeroVariance {
            display("Seed time series has zero variance and cannot be z-scored")
        }

        EmptyCluster {
            display("Image has no non-zero voxels")
        }
    }
}

/// Alias type for results originated from this crate.
pub type Result<T> = ::std::result::Result<T, ContargError>;
