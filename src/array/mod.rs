//! Labeled N-dimensional arrays
//!
//! A [`MetaArray`] pairs element storage with one [`AxisInfo`] per axis plus
//! a trailing descriptor for the array as a whole.

mod display;
mod ops;
mod storage;

pub use ops::{BinaryOp, Operand};
pub(crate) use display::format_g;
pub(crate) use storage::Storage;

use crate::error::{Error, Result};
use crate::index::{AxisSelection, Selector, resolve};
use crate::mapped::MappedArray;
use crate::types::{AxisInfo, AxisRef, AxisSpec, Buffer, DType, Name, Value, axis_index, column_index};

/// Result of indexing: a single element or a sub-array
#[derive(Debug)]
pub enum Item {
    Scalar(Value),
    Array(MetaArray),
}

impl Item {
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Item::Scalar(v) => Some(v),
            Item::Array(_) => None,
        }
    }

    pub fn into_array(self) -> Option<MetaArray> {
        match self {
            Item::Array(a) => Some(a),
            Item::Scalar(_) => None,
        }
    }
}

/// N-dimensional array with per-axis metadata
#[derive(Debug)]
pub struct MetaArray {
    storage: Storage,
    info: Vec<AxisInfo>,
}

impl MetaArray {
    /// Wrap `data`, validating and padding `info` to `ndim + 1` entries
    pub fn new(data: impl Into<Buffer>, info: Vec<AxisInfo>) -> Result<Self> {
        Self::from_storage(Storage::Memory(data.into()), info)
    }

    pub(crate) fn from_storage(storage: Storage, mut info: Vec<AxisInfo>) -> Result<Self> {
        check_info(storage.shape(), &mut info)?;
        Ok(Self { storage, info })
    }

    pub(crate) fn from_mapped(mapped: MappedArray, info: Vec<AxisInfo>) -> Result<Self> {
        Self::from_storage(Storage::Mapped(mapped), info)
    }

    /// Info known to be consistent with `data`
    fn derived(data: Buffer, info: Vec<AxisInfo>) -> Self {
        Self {
            storage: Storage::Memory(data),
            info,
        }
    }

    pub fn shape(&self) -> &[usize] {
        self.storage.shape()
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Extent of the first axis
    pub fn len(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether elements are held in memory (not mapped or streamed from a file)
    pub fn is_in_memory(&self) -> bool {
        self.storage.is_memory()
    }

    /// In-memory elements, if the array is not file-backed
    pub fn data(&self) -> Option<&Buffer> {
        match &self.storage {
            Storage::Memory(b) => Some(b),
            _ => None,
        }
    }

    /// The mapped array, if the array is memory-mapped
    pub fn mapped(&self) -> Option<&MappedArray> {
        match &self.storage {
            Storage::Mapped(m) => Some(m),
            _ => None,
        }
    }

    /// Materialize the elements
    pub fn to_buffer(&self) -> Result<Buffer> {
        self.storage.to_buffer()
    }

    /// Deep copy into memory
    pub fn copy(&self) -> Result<MetaArray> {
        Ok(Self::derived(self.to_buffer()?, self.info_copy()))
    }

    pub fn info(&self) -> &[AxisInfo] {
        &self.info
    }

    pub fn info_copy(&self) -> Vec<AxisInfo> {
        self.info.clone()
    }

    /// Replace one info slot (`ndim` is the trailing descriptor)
    pub fn set_axis_info(&mut self, slot: usize, info: AxisInfo) -> Result<()> {
        if slot > self.ndim() {
            return Err(Error::InvalidInfo(format!(
                "slot {slot} does not exist for a {}-dimensional array",
                self.ndim()
            )));
        }
        let mut all = self.info.clone();
        all[slot] = info;
        check_info(self.shape(), &mut all)?;
        self.info = all;
        Ok(())
    }

    /// Release file resources, reporting any error
    pub fn close(self) -> Result<()> {
        self.storage.close()
    }

    // ========================================================================
    // Indexing
    // ========================================================================

    /// Select elements, returning a scalar when every axis is indexed
    pub fn get(&self, expr: &[Selector]) -> Result<Item> {
        let sel = resolve(expr, self.shape(), &self.info)?;
        let data = self.storage.select(&sel)?;
        if !sel.iter().any(AxisSelection::keeps_axis) {
            let value = data
                .scalar(&[])
                .ok_or_else(|| Error::shape("selection did not reduce to one element"))?;
            return Ok(Item::Scalar(value));
        }
        let info = self.selected_info(&sel);
        Ok(Item::Array(Self::derived(data, info)))
    }

    /// Same as [`MetaArray::get`], failing unless the result is an array
    pub fn get_array(&self, expr: &[Selector]) -> Result<MetaArray> {
        match self.get(expr)? {
            Item::Array(a) => Ok(a),
            Item::Scalar(_) => Err(Error::shape("selection reduced to a single element")),
        }
    }

    /// Assign `value` (broadcast to the selection) in place
    pub fn set(&mut self, expr: &[Selector], value: &Buffer) -> Result<()> {
        let sel = resolve(expr, self.shape(), &self.info)?;
        self.storage.assign(&sel, value)
    }

    /// Info for a selection: kept axes are sliced, indexed axes fold into
    /// the trailing descriptor
    fn selected_info(&self, sel: &[AxisSelection]) -> Vec<AxisInfo> {
        let ndim = self.ndim();
        let mut extra = self.info[ndim].spec().clone();
        let mut info = Vec::with_capacity(ndim + 1);

        for (axis, s) in sel.iter().enumerate() {
            let spec = self.info[axis].spec();
            let AxisSelection::Index(position) = s else {
                info.push(AxisInfo::from(spec.slice(s)));
                continue;
            };

            let col = spec.cols.as_ref().and_then(|c| c.get(*position));
            if let Some(col) = col {
                let cols = extra.cols.get_or_insert_with(Vec::new);
                if !cols.contains(col) {
                    cols.push(col.clone());
                }
                if extra.units.is_none() {
                    extra.units = col.units.clone();
                }
            }
            if extra.units.is_none() {
                extra.units = spec.units.clone();
            }
            for (key, value) in &spec.extra {
                extra.extra.entry(key.clone()).or_insert_with(|| value.clone());
            }
            if extra.name.is_none() {
                let col_name = col.and_then(|c| c.name.as_ref());
                extra.name = match (&spec.name, col_name) {
                    (Some(name), Some(col_name)) => Some(Name::Str(format!("{name}: {col_name}"))),
                    (Some(name), None) => Some(name.clone()),
                    (None, Some(col_name)) => Some(col_name.clone()),
                    (None, None) => None,
                };
            }
        }
        info.push(AxisInfo::from(extra));
        info
    }

    // ========================================================================
    // Axis queries
    // ========================================================================

    pub fn axis_index(&self, axis: impl Into<AxisRef>) -> Result<usize> {
        axis_index(&self.info, self.ndim(), &axis.into())
    }

    fn axis_spec(&self, axis: impl Into<AxisRef>) -> Result<(usize, &AxisSpec)> {
        let i = self.axis_index(axis)?;
        Ok((i, self.info[i].spec()))
    }

    pub fn axis_values(&self, axis: impl Into<AxisRef>) -> Result<&Buffer> {
        let (i, spec) = self.axis_spec(axis)?;
        spec.values.as_ref().ok_or(Error::MissingValues(i))
    }

    pub fn axis_has_values(&self, axis: impl Into<AxisRef>) -> Result<bool> {
        Ok(self.axis_spec(axis)?.1.values.is_some())
    }

    pub fn axis_has_columns(&self, axis: impl Into<AxisRef>) -> Result<bool> {
        Ok(self.axis_spec(axis)?.1.cols.is_some())
    }

    pub fn axis_units(&self, axis: impl Into<AxisRef>) -> Result<Option<&str>> {
        Ok(self.axis_spec(axis)?.1.units.as_deref())
    }

    /// Axis name, or its position when unnamed
    pub fn axis_name(&self, axis: usize) -> Name {
        self.info
            .get(axis)
            .and_then(|ax| ax.spec().name.clone())
            .unwrap_or_else(|| Name::Str(axis.to_string()))
    }

    pub fn column_index(&self, axis: impl Into<AxisRef>, column: impl Into<Name>) -> Result<usize> {
        let i = self.axis_index(axis)?;
        column_index(&self.info, i, &column.into())
    }

    pub fn has_column(&self, axis: impl Into<AxisRef>, column: impl Into<Name>) -> Result<bool> {
        Ok(self.axis_spec(axis)?.1.column_position(&column.into()).is_some())
    }

    /// Column names of one axis; unnamed columns are listed by position
    pub fn list_columns(&self, axis: impl Into<AxisRef>) -> Result<Vec<Name>> {
        let (_, spec) = self.axis_spec(axis)?;
        Ok(column_names(spec))
    }

    /// Column names of every axis, keyed by axis name
    pub fn all_columns(&self) -> Vec<(Name, Vec<Name>)> {
        (0..self.ndim())
            .map(|i| (self.axis_name(i), column_names(self.info[i].spec())))
            .collect()
    }

    pub fn column_name(&self, axis: impl Into<AxisRef>, column: usize) -> Result<Option<&Name>> {
        let (i, spec) = self.axis_spec(axis)?;
        let cols = spec.cols.as_deref().unwrap_or_default();
        cols.get(column)
            .map(|c| c.name.as_ref())
            .ok_or(Error::IndexOutOfBounds {
                axis: i,
                index: column as isize,
                len: cols.len(),
            })
    }

    pub fn column_units(&self, axis: impl Into<AxisRef>, column: impl Into<Name>) -> Result<Option<&str>> {
        let i = self.axis_index(axis)?;
        let c = column_index(&self.info, i, &column.into())?;
        Ok(self.info[i].spec().cols.as_ref().and_then(|cols| cols[c].units.as_deref()))
    }
}

impl From<Buffer> for MetaArray {
    fn from(data: Buffer) -> Self {
        let info = vec![AxisInfo::Empty; data.ndim() + 1];
        Self::derived(data, info)
    }
}

fn column_names(spec: &AxisSpec) -> Vec<Name> {
    spec.cols
        .iter()
        .flatten()
        .enumerate()
        .map(|(i, c)| c.name.clone().unwrap_or_else(|| Name::Str(i.to_string())))
        .collect()
}

/// Pad `info` to `ndim + 1` slots and check per-axis lengths
fn check_info(shape: &[usize], info: &mut Vec<AxisInfo>) -> Result<()> {
    let ndim = shape.len();
    if info.len() > ndim + 1 {
        return Err(Error::InvalidInfo(format!(
            "{} info entries given for {ndim}-dimensional data (at most {} allowed)",
            info.len(),
            ndim + 1
        )));
    }
    info.resize(ndim + 1, AxisInfo::Empty);

    for (axis, &len) in shape.iter().enumerate() {
        let spec = info[axis].spec();
        if let Some(values) = &spec.values {
            if values.ndim() != 1 {
                return Err(Error::InvalidInfo(format!(
                    "values for axis {axis} must be 1-D, got {} dimensions",
                    values.ndim()
                )));
            }
            if values.len() != len {
                return Err(Error::shape(format!(
                    "axis {axis} has {} values but length {len}",
                    values.len()
                )));
            }
        }
        if let Some(cols) = &spec.cols {
            if cols.len() != len {
                return Err(Error::shape(format!(
                    "axis {axis} has {} columns but length {len}",
                    cols.len()
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::NamedSelector;
    use crate::types::ColumnSpec;
    use ndarray::{ArrayD, IxDyn};

    /// `vals` x `lat` x `lon`, element = 100*v + 10*lat + lon
    fn terrain() -> MetaArray {
        let data = ArrayD::from_shape_fn(IxDyn(&[2, 3, 4]), |i| (100 * i[0] + 10 * i[1] + i[2]) as f64);
        MetaArray::new(
            data,
            vec![
                AxisSpec::named("vals")
                    .with_cols([
                        ColumnSpec::named("altitude").with_units("m"),
                        ColumnSpec::named("rainfall").with_units("cm/year"),
                    ])
                    .into(),
                AxisSpec::named("lat")
                    .with_values(Buffer::from_elements(vec![10.0, 20.0, 30.0]))
                    .with_extra("title", "Latitude")
                    .into(),
                AxisSpec::named("lon").with_units("deg").into(),
            ],
        )
        .unwrap()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    #[test]
    fn test_info_is_padded() {
        let a = terrain();
        assert_eq!(a.info().len(), 4);
        assert_eq!(a.info()[3], AxisInfo::Empty);
    }

    #[test]
    fn test_info_is_checked() {
        let data = Buffer::zeros(DType::F32, &[2, 3]);
        let too_long = vec![AxisInfo::Empty; 4];
        assert!(matches!(
            MetaArray::new(data.clone(), too_long),
            Err(Error::InvalidInfo(_))
        ));

        let bad_values = vec![AxisSpec::default().with_values(Buffer::from_elements(vec![1.0])).into()];
        assert!(matches!(
            MetaArray::new(data.clone(), bad_values),
            Err(Error::ShapeMismatch(_))
        ));

        let bad_cols = vec![
            AxisInfo::Empty,
            AxisSpec::default().with_cols([ColumnSpec::named("a")]).into(),
        ];
        assert!(matches!(
            MetaArray::new(data.clone(), bad_cols),
            Err(Error::ShapeMismatch(_))
        ));

        let nd_values = vec![AxisSpec::default().with_values(Buffer::zeros(DType::F64, &[2, 1])).into()];
        assert!(matches!(
            MetaArray::new(data, nd_values),
            Err(Error::InvalidInfo(_))
        ));
    }

    // ========================================================================
    // Indexing
    // ========================================================================

    #[test]
    fn test_scalar_access() {
        let a = terrain();
        let item = a
            .get(&[Selector::column("rainfall"), Selector::Index(2), Selector::Index(-1)])
            .unwrap();
        assert_eq!(item.as_scalar(), Some(&Value::Float(123.0)));
    }

    #[test]
    fn test_named_access_matches_positional() {
        let a = terrain();
        let named = a
            .get(&[
                Selector::named("lon", NamedSelector::Index(3)),
                Selector::named("lat", NamedSelector::Index(2)),
                Selector::named("vals", NamedSelector::Column("rainfall".into())),
            ])
            .unwrap();
        assert_eq!(named.as_scalar(), Some(&Value::Float(123.0)));
    }

    #[test]
    fn test_collapsed_axes_fold_into_trailing_info() {
        let a = terrain();
        let sub = a.get_array(&[Selector::column("rainfall")]).unwrap();
        assert_eq!(sub.shape(), &[3, 4]);
        assert_eq!(sub.info().len(), 3);
        let trailing = sub.info()[2].spec();
        assert_eq!(trailing.name, Some(Name::from("vals: rainfall")));
        assert_eq!(trailing.units.as_deref(), Some("cm/year"));
        assert_eq!(trailing.cols.as_ref().map(Vec::len), Some(1));
        assert_eq!(sub.axis_name(0), Name::from("lat"));
    }

    #[test]
    fn test_folding_keeps_first_name_and_merges_extras() {
        let a = terrain();
        let row = a.get_array(&[Selector::Index(0), Selector::Index(1)]).unwrap();
        assert_eq!(row.shape(), &[4]);
        let trailing = row.info()[1].spec();
        assert_eq!(trailing.name, Some(Name::from("vals: altitude")));
        assert_eq!(trailing.units.as_deref(), Some("m"));
        assert_eq!(trailing.extra.get("title"), Some(&Value::from("Latitude")));
        assert!(trailing.values.is_none());
    }

    #[test]
    fn test_kept_axes_are_sliced() {
        let a = terrain();
        let sub = a
            .get_array(&[Selector::all(), Selector::named("lat", NamedSelector::Range(Some(15.0), None))])
            .unwrap();
        assert_eq!(sub.shape(), &[2, 2, 4]);
        assert_eq!(
            sub.axis_values("lat").unwrap().to_f64_vec().unwrap(),
            vec![20.0, 30.0]
        );
        // source metadata untouched
        assert_eq!(a.axis_values("lat").unwrap().len(), 3);
    }

    #[test]
    fn test_set_in_place() {
        let mut a = terrain();
        a.set(
            &[Selector::column("altitude"), Selector::all(), Selector::Index(0)],
            &Buffer::from_elements(vec![-1.0, -2.0, -3.0]),
        )
        .unwrap();
        let col = a
            .get_array(&[Selector::Index(0), Selector::all(), Selector::Index(0)])
            .unwrap();
        assert_eq!(col.to_buffer().unwrap().to_f64_vec().unwrap(), vec![-1.0, -2.0, -3.0]);
        let untouched = a.get(&[Selector::Index(1), Selector::Index(0), Selector::Index(0)]).unwrap();
        assert_eq!(untouched.as_scalar(), Some(&Value::Float(100.0)));
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[test]
    fn test_axis_queries() {
        let a = terrain();
        assert_eq!(a.axis_index("lon").unwrap(), 2);
        assert!(a.axis_has_values("lat").unwrap());
        assert!(!a.axis_has_values("lon").unwrap());
        assert!(matches!(a.axis_values("lon"), Err(Error::MissingValues(2))));
        assert!(a.axis_has_columns(0usize).unwrap());
        assert_eq!(a.axis_units("lon").unwrap(), Some("deg"));
        assert_eq!(a.axis_units("lat").unwrap(), None);
        assert!(a.has_column("vals", "rainfall").unwrap());
        assert!(!a.has_column("lat", "rainfall").unwrap());
        assert_eq!(
            a.list_columns("vals").unwrap(),
            vec![Name::from("altitude"), Name::from("rainfall")]
        );
        assert_eq!(a.column_name("vals", 1).unwrap(), Some(&Name::from("rainfall")));
        assert_eq!(a.column_units("vals", "altitude").unwrap(), Some("m"));
        assert!(matches!(
            a.column_units("vals", "snow"),
            Err(Error::UnknownColumn { axis: 0, .. })
        ));
        let all = a.all_columns();
        assert_eq!(all[1], (Name::from("lat"), vec![]));
    }

    #[test]
    fn test_unnamed_axes_fall_back_to_position() {
        let a = MetaArray::from(Buffer::zeros(DType::U8, &[2, 2]));
        assert_eq!(a.axis_name(1), Name::from("1"));
        assert!(matches!(a.axis_index("x"), Err(Error::UnknownAxis(_))));
    }

    #[test]
    fn test_set_axis_info_validates() {
        let mut a = terrain();
        a.set_axis_info(3, AxisSpec::named("terrain").with_units("m").into()).unwrap();
        assert_eq!(a.info()[3].spec().units.as_deref(), Some("m"));
        let err = a.set_axis_info(2, AxisSpec::default().with_cols([ColumnSpec::named("x")]).into());
        assert!(matches!(err, Err(Error::ShapeMismatch(_))));
        assert!(a.info()[2].spec().cols.is_none());
    }
}
