use crate::common_io::{mkdir_parent, read_lines_of_types, write_lines, Delimiter};
use crate::traits::IoOps;
pub use nalgebra::{DMatrix, DVector};

use std::fmt::Display;
use std::str::FromStr;

impl<T> IoOps for DMatrix<T>
where
    T: nalgebra::Scalar + FromStr + Display + Send + Copy,
    <T as FromStr>::Err: Display,
{
    type Scalar = T;
    type Mat = Self;

    fn read_file_delim(
        file: &str,
        delim: impl Into<Delimiter>,
        skip: Option<usize>,
    ) -> anyhow::Result<Self::Mat> {
        let rows = read_lines_of_types::<T>(file, delim, skip)?;

        if rows.is_empty() {
            return Err(anyhow::anyhow!("No data in file: {}", file));
        }

        let nrows = rows.len();
        let ncols = rows[0].len();

        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != ncols) {
            anyhow::bail!(
                "{}: row {} has {} fields, expected {}",
                file,
                i + 1,
                row.len(),
                ncols
            );
        }

        Ok(DMatrix::<T>::from_row_iterator(
            nrows,
            ncols,
            rows.into_iter().flatten(),
        ))
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()> {
        mkdir_parent(file)?;
        let lines = self
            .row_iter()
            .map(|row| {
                row.iter()
                    .map(|x| format!("{}", *x))
                    .collect::<Vec<String>>()
                    .join(delim)
                    .into_boxed_str()
            })
            .collect::<Vec<_>>();
        write_lines(&lines, file)
    }
}
