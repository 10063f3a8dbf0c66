use crate::common_io::Delimiter;
use rand::Rng;

/// Operations to sample random matrices
pub trait SampleOps {
    type Mat;
    type Scalar;

    /// Sample a matrix from a uniform distribution `U(0,1)`
    fn runif(nrow: usize, ncol: usize) -> Self::Mat;

    /// Sample `N(0,1)` entries from a caller-supplied generator, in
    /// storage order, so that a seeded `rng` reproduces the matrix.
    fn rnorm_with<R: Rng + ?Sized>(nrow: usize, ncol: usize, rng: &mut R) -> Self::Mat;
}

/// Row-wise summaries and transformations
pub trait MatOps {
    type Mat;
    type Vec;
    type Scalar;

    /// Subtract the mean of each row from that row
    fn centre_rows_inplace(&mut self);

    /// `out[i] = (1/ncol) * sum_j x[i,j]^2`
    fn row_mean_squares(&self) -> Self::Vec;

    /// Number of entries that are exactly zero
    fn count_zeros(&self) -> usize;
}

/// Read and write matrices from and to files
pub trait IoOps {
    type Scalar;
    type Mat;

    /// Read a delimited text file, one matrix row per line.
    /// * `skip` - number of leading (header) lines to ignore
    fn read_file_delim(
        file: &str,
        delim: impl Into<Delimiter>,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat>;

    fn from_tsv(tsv_file: &str, skip: Option<usize>) -> anyhow::Result<Self::Mat> {
        Self::read_file_delim(tsv_file, "\t", skip)
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()>;

    fn to_tsv(&self, tsv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t")
    }
}
