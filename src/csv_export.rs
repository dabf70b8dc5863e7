//! CSV export of 2-D arrays

use crate::array::{MetaArray, format_g};
use crate::error::{Error, Result};
use ndarray::IxDyn;
use std::path::Path;

impl MetaArray {
    /// Columnar text: one line per position along axis 1 holding `x[:, j]`
    ///
    /// If axis 0 carries columns their names form the first line. With a
    /// path the text is also written there.
    pub fn to_csv(&self, path: Option<&Path>) -> Result<String> {
        if self.ndim() != 2 {
            return Err(Error::UnsupportedRank(self.ndim()));
        }
        let data = self.to_buffer()?.to_f64_array()?;
        let (rows, lines) = (self.shape()[0], self.shape()[1]);

        let mut w = csv::WriterBuilder::new().from_writer(Vec::new());
        if let Some(cols) = &self.info()[0].spec().cols {
            w.write_record(
                cols.iter()
                    .map(|c| c.name.as_ref().map(|n| n.to_string()).unwrap_or_default()),
            )?;
        }
        for j in 0..lines {
            w.write_record((0..rows).map(|i| format_g(data[IxDyn(&[i, j])])))?;
        }
        let bytes = w.into_inner().map_err(|e| Error::Io(e.into_error()))?;
        let text = String::from_utf8_lossy(&bytes).into_owned();

        if let Some(path) = path {
            std::fs::write(path, &text)?;
            log::debug!("{}: wrote {lines} csv rows", path.display());
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AxisSpec, Buffer, ColumnSpec, DType};

    fn traces() -> MetaArray {
        MetaArray::new(
            Buffer::from_vec(&[2, 3], vec![0.0f64, 0.5, 1.0, 10.0, 20.0, 1e-5]).unwrap(),
            vec![
                AxisSpec::default()
                    .with_cols([ColumnSpec::named("time"), ColumnSpec::named("current")])
                    .into(),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_columns_become_header() {
        let text = traces().to_csv(None).unwrap();
        assert_eq!(text, "time,current\n0,10\n0.5,20\n1,1e-05\n");
    }

    #[test]
    fn test_without_columns() {
        let a = MetaArray::new(Buffer::from_vec(&[1, 2], vec![3i32, 4]).unwrap(), vec![]).unwrap();
        assert_eq!(a.to_csv(None).unwrap(), "3\n4\n");
    }

    #[test]
    fn test_written_to_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let text = traces().to_csv(Some(&path)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
    }

    #[test]
    fn test_rank_checked() {
        let a = MetaArray::new(Buffer::zeros(DType::F64, &[4]), vec![]).unwrap();
        assert!(matches!(a.to_csv(None), Err(Error::UnsupportedRank(1))));
    }
}
