//! Index expressions and their resolution to per-axis selections
//!
//! An expression is a list of [`Selector`]s. Positional selectors consume
//! the axis at their position in the list; [`Selector::Named`] targets an
//! axis by name and may only be followed by other named selectors.

use crate::error::{Error, Result};
use crate::types::{AxisInfo, AxisRef, Name, axis_index, column_index};
use std::ops::Range;

/// One entry of an index list: a position or a column name
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    Index(isize),
    Column(Name),
}

impl From<isize> for Entry {
    fn from(v: isize) -> Self {
        Entry::Index(v)
    }
}

impl From<&str> for Entry {
    fn from(v: &str) -> Self {
        Entry::Column(v.into())
    }
}

impl From<Name> for Entry {
    fn from(v: Name) -> Self {
        Entry::Column(v)
    }
}

/// One slot of an index expression
#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    /// Position, negative counts from the end
    Index(isize),
    Slice {
        start: Option<isize>,
        stop: Option<isize>,
        step: Option<isize>,
    },
    /// Boolean mask over the whole axis
    Mask(Vec<bool>),
    /// Column of the axis at this position
    Column(Name),
    /// Gather these positions or columns
    List(Vec<Entry>),
    Named(Name, NamedSelector),
}

impl Selector {
    /// `..`
    pub fn all() -> Self {
        Selector::Slice {
            start: None,
            stop: None,
            step: None,
        }
    }

    /// `start..stop`
    pub fn range(start: isize, stop: isize) -> Self {
        Selector::Slice {
            start: Some(start),
            stop: Some(stop),
            step: None,
        }
    }

    pub fn named(axis: impl Into<Name>, sel: NamedSelector) -> Self {
        Selector::Named(axis.into(), sel)
    }

    pub fn column(name: impl Into<Name>) -> Self {
        Selector::Column(name.into())
    }
}

/// Selection applied to a named axis
#[derive(Debug, Clone, PartialEq)]
pub enum NamedSelector {
    Column(Name),
    /// Positions whose axis value lies in `[lower, upper)`
    Range(Option<f64>, Option<f64>),
    Index(isize),
    Slice(Option<isize>, Option<isize>),
    List(Vec<Entry>),
    All,
}

/// Resolved selection along one axis
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AxisSelection {
    /// Single position; the axis is removed from the result
    Index(usize),
    Range { start: usize, stop: usize, step: usize },
    Indices(Vec<usize>),
}

impl AxisSelection {
    pub fn all(len: usize) -> Self {
        AxisSelection::Range {
            start: 0,
            stop: len,
            step: 1,
        }
    }

    /// Whether the axis survives selection
    pub fn keeps_axis(&self) -> bool {
        !matches!(self, AxisSelection::Index(_))
    }

    /// Number of selected positions
    pub fn count(&self) -> usize {
        match self {
            AxisSelection::Index(_) => 1,
            AxisSelection::Range { start, stop, step } => {
                if stop <= start {
                    0
                } else {
                    (stop - start - 1) / step + 1
                }
            }
            AxisSelection::Indices(v) => v.len(),
        }
    }

    /// Selected positions in selection order
    pub fn positions(&self) -> Vec<usize> {
        match self {
            AxisSelection::Index(i) => vec![*i],
            AxisSelection::Range { start, stop, step } => (*start..*stop).step_by(*step).collect(),
            AxisSelection::Indices(v) => v.clone(),
        }
    }

    /// Smallest range containing every selected position
    pub fn bounds(&self) -> Range<usize> {
        match self {
            AxisSelection::Index(i) => *i..*i + 1,
            AxisSelection::Range { start, .. } if self.count() == 0 => *start..*start,
            AxisSelection::Range { start, step, .. } => {
                *start..*start + (self.count() - 1) * step + 1
            }
            AxisSelection::Indices(v) => match (v.iter().min(), v.iter().max()) {
                (Some(lo), Some(hi)) => *lo..*hi + 1,
                _ => 0..0,
            },
        }
    }

    /// Same selection relative to a region starting at `offset`
    pub fn shifted(&self, offset: usize) -> Self {
        match self {
            AxisSelection::Index(i) => AxisSelection::Index(i - offset),
            AxisSelection::Range { start, step, .. } => AxisSelection::Range {
                start: start.saturating_sub(offset),
                stop: self.bounds().end.saturating_sub(offset),
                step: *step,
            },
            AxisSelection::Indices(v) => AxisSelection::Indices(v.iter().map(|i| i - offset).collect()),
        }
    }
}

/// Half-open span along one axis, open ends reach the axis bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: Option<usize>,
    pub stop: Option<usize>,
}

impl Span {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(start: usize, stop: usize) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
        }
    }

    /// Concrete range clamped to `len`
    pub fn range(&self, len: usize) -> Range<usize> {
        let stop = self.stop.unwrap_or(len).min(len);
        let start = self.start.unwrap_or(0).min(stop);
        start..stop
    }
}

impl From<Range<usize>> for Span {
    fn from(r: Range<usize>) -> Self {
        Span::new(r.start, r.end)
    }
}

/// Resolve an expression against an array's shape and axis info
///
/// Returns one selection per axis; axes the expression does not mention
/// select everything.
pub fn resolve(expr: &[Selector], shape: &[usize], info: &[AxisInfo]) -> Result<Vec<AxisSelection>> {
    let ndim = shape.len();
    if expr.len() > ndim {
        return Err(Error::TooManySelectors {
            given: expr.len(),
            ndim,
        });
    }

    let mut out: Vec<AxisSelection> = shape.iter().map(|&len| AxisSelection::all(len)).collect();
    let mut positional_ok = true;

    for (pos, sel) in expr.iter().enumerate() {
        if let Selector::Named(axis_name, named) = sel {
            let axis = axis_index(info, ndim, &AxisRef::Name(axis_name.clone()))?;
            out[axis] = resolve_named(named, axis, shape[axis], info)?;
            positional_ok = false;
            continue;
        }
        if !positional_ok {
            return Err(Error::OrderingError);
        }
        out[pos] = resolve_positional(sel, pos, shape[pos], info)?;
    }
    Ok(out)
}

fn resolve_positional(sel: &Selector, axis: usize, len: usize, info: &[AxisInfo]) -> Result<AxisSelection> {
    match sel {
        Selector::Index(i) => Ok(AxisSelection::Index(position(*i, axis, len)?)),
        Selector::Slice { start, stop, step } => slice(*start, *stop, *step, len),
        Selector::Mask(bits) => {
            if bits.len() != len {
                return Err(Error::shape(format!(
                    "mask of length {} for axis {axis} of length {len}",
                    bits.len()
                )));
            }
            Ok(AxisSelection::Indices(
                bits.iter().enumerate().filter(|(_, b)| **b).map(|(i, _)| i).collect(),
            ))
        }
        Selector::Column(name) => Ok(AxisSelection::Index(column_index(info, axis, name)?)),
        Selector::List(entries) => entry_list(entries, axis, len, info),
        Selector::Named(..) => unreachable!("named selectors are handled by resolve"),
    }
}

fn resolve_named(sel: &NamedSelector, axis: usize, len: usize, info: &[AxisInfo]) -> Result<AxisSelection> {
    match sel {
        NamedSelector::Column(name) => Ok(AxisSelection::Index(column_index(info, axis, name)?)),
        NamedSelector::Range(lower, upper) => {
            let values = info
                .get(axis)
                .and_then(|ax| ax.spec().values.as_ref())
                .ok_or(Error::MissingValues(axis))?;
            let values = values.to_f64_vec()?;
            let keep = |v: f64| lower.is_none_or(|lo| v >= lo) && upper.is_none_or(|hi| v < hi);
            Ok(AxisSelection::Indices(
                values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| keep(**v))
                    .map(|(i, _)| i)
                    .collect(),
            ))
        }
        NamedSelector::Index(i) => Ok(AxisSelection::Index(position(*i, axis, len)?)),
        NamedSelector::Slice(start, stop) => slice(*start, *stop, None, len),
        NamedSelector::List(entries) => entry_list(entries, axis, len, info),
        NamedSelector::All => Ok(AxisSelection::all(len)),
    }
}

fn entry_list(entries: &[Entry], axis: usize, len: usize, info: &[AxisInfo]) -> Result<AxisSelection> {
    entries
        .iter()
        .map(|e| match e {
            Entry::Index(i) => position(*i, axis, len),
            Entry::Column(name) => column_index(info, axis, name),
        })
        .collect::<Result<Vec<_>>>()
        .map(AxisSelection::Indices)
}

fn position(index: isize, axis: usize, len: usize) -> Result<usize> {
    let resolved = if index < 0 { index + len as isize } else { index };
    if resolved < 0 || resolved >= len as isize {
        return Err(Error::IndexOutOfBounds { axis, index, len });
    }
    Ok(resolved as usize)
}

/// Slice bounds with Python semantics; negative steps become index lists
fn slice(start: Option<isize>, stop: Option<isize>, step: Option<isize>, len: usize) -> Result<AxisSelection> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(Error::InvalidOptions("slice step can not be zero".into()));
    }
    let n = len as isize;
    let clamp = |v: isize, lo: isize, hi: isize| {
        let v = if v < 0 { v + n } else { v };
        v.clamp(lo, hi)
    };

    if step > 0 {
        let start = start.map_or(0, |v| clamp(v, 0, n)) as usize;
        let stop = stop.map_or(n, |v| clamp(v, 0, n)) as usize;
        return Ok(AxisSelection::Range {
            start,
            stop: stop.max(start),
            step: step as usize,
        });
    }

    let start = start.map_or(n - 1, |v| clamp(v, -1, n - 1));
    let stop = stop.map_or(-1, |v| clamp(v, -1, n - 1));
    let mut indices = Vec::new();
    let mut i = start;
    while i > stop {
        indices.push(i as usize);
        i += step;
    }
    Ok(AxisSelection::Indices(indices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AxisSpec, Buffer, ColumnSpec};

    fn z_first() -> Vec<AxisInfo> {
        vec![
            AxisSpec::named("z")
                .with_values(Buffer::from_elements(vec![0.0, 1.0, 2.0]))
                .into(),
            AxisSpec::named("cols")
                .with_cols([ColumnSpec::named("a"), ColumnSpec::named("b")])
                .into(),
            AxisInfo::Empty,
        ]
    }

    // ========================================================================
    // Positional
    // ========================================================================

    #[test]
    fn test_unspecified_axes_select_everything() {
        let out = resolve(&[Selector::Index(-1)], &[3, 2], &z_first()).unwrap();
        assert_eq!(out, vec![AxisSelection::Index(2), AxisSelection::all(2)]);
    }

    #[test]
    fn test_python_slices() {
        let s = |start, stop, step| slice(start, stop, step, 5).unwrap();
        assert_eq!(s(Some(1), Some(-1), None).positions(), vec![1, 2, 3]);
        assert_eq!(s(None, None, Some(2)).positions(), vec![0, 2, 4]);
        assert_eq!(s(None, None, Some(-1)).positions(), vec![4, 3, 2, 1, 0]);
        assert_eq!(s(Some(3), Some(0), Some(-2)).positions(), vec![3, 1]);
        assert_eq!(s(Some(4), Some(2), None).count(), 0);
        assert_eq!(s(Some(-10), Some(10), None).positions(), vec![0, 1, 2, 3, 4]);
        assert!(slice(None, None, Some(0), 5).is_err());
    }

    #[test]
    fn test_bounds_and_shift() {
        let sel = AxisSelection::Range {
            start: 2,
            stop: 9,
            step: 3,
        };
        assert_eq!(sel.positions(), vec![2, 5, 8]);
        assert_eq!(sel.bounds(), 2..9);
        assert_eq!(sel.shifted(2).positions(), vec![0, 3, 6]);
        assert_eq!(AxisSelection::Indices(vec![7, 3]).bounds(), 3..8);
    }

    #[test]
    fn test_shift_stops_at_region_end() {
        // step 2 over 4 positions only reaches 0..3
        let sel = AxisSelection::Range {
            start: 0,
            stop: 4,
            step: 2,
        };
        assert_eq!(
            sel.shifted(0),
            AxisSelection::Range {
                start: 0,
                stop: 3,
                step: 2
            }
        );
        let tail = AxisSelection::Range {
            start: 1,
            stop: 6,
            step: 2,
        };
        assert_eq!(tail.shifted(1).positions(), vec![0, 2, 4]);
        assert_eq!(tail.shifted(1).bounds(), 0..5);
    }

    #[test]
    fn test_masks_and_lists() {
        let info = z_first();
        let out = resolve(
            &[
                Selector::Mask(vec![true, false, true]),
                Selector::List(vec![Entry::from("b"), Entry::Index(0)]),
            ],
            &[3, 2],
            &info,
        )
        .unwrap();
        assert_eq!(out[0], AxisSelection::Indices(vec![0, 2]));
        assert_eq!(out[1], AxisSelection::Indices(vec![1, 0]));

        let err = resolve(&[Selector::Mask(vec![true])], &[3, 2], &info);
        assert!(matches!(err, Err(Error::ShapeMismatch(_))));
    }

    #[test]
    fn test_positional_column_uses_the_axis_at_that_slot() {
        let info = z_first();
        let out = resolve(&[Selector::all(), Selector::column("b")], &[3, 2], &info).unwrap();
        assert_eq!(out[1], AxisSelection::Index(1));
        let err = resolve(&[Selector::column("b")], &[3, 2], &info);
        assert!(matches!(err, Err(Error::UnknownColumn { axis: 0, .. })));
    }

    #[test]
    fn test_bounds_errors() {
        let info = z_first();
        assert!(matches!(
            resolve(&[Selector::Index(3)], &[3, 2], &info),
            Err(Error::IndexOutOfBounds { axis: 0, index: 3, len: 3 })
        ));
        assert!(matches!(
            resolve(&[Selector::Index(0), Selector::Index(0), Selector::Index(0)], &[3, 2], &info),
            Err(Error::TooManySelectors { given: 3, ndim: 2 })
        ));
    }

    // ========================================================================
    // Named
    // ========================================================================

    #[test]
    fn test_named_index_matches_positional() {
        let info = z_first();
        let named = resolve(&[Selector::named("z", NamedSelector::Index(1))], &[3, 2], &info).unwrap();
        let positional = resolve(&[Selector::Index(1)], &[3, 2], &info).unwrap();
        assert_eq!(named, positional);

        let info = vec![AxisInfo::Empty, AxisSpec::named("z").into(), AxisInfo::Empty];
        let named = resolve(&[Selector::named("z", NamedSelector::Index(1))], &[2, 3], &info).unwrap();
        let positional = resolve(&[Selector::all(), Selector::Index(1)], &[2, 3], &info).unwrap();
        assert_eq!(named, positional);
    }

    #[test]
    fn test_value_range() {
        let info = vec![
            AxisSpec::named("x")
                .with_values(Buffer::from_elements(vec![0i64, 1, 2, 3, 4]))
                .into(),
            AxisInfo::Empty,
        ];
        let out = resolve(
            &[Selector::named("x", NamedSelector::Range(Some(1.5), Some(3.5)))],
            &[5],
            &info,
        )
        .unwrap();
        assert_eq!(out, vec![AxisSelection::Indices(vec![2, 3])]);

        let out = resolve(&[Selector::named("x", NamedSelector::Range(None, Some(2.0)))], &[5], &info).unwrap();
        assert_eq!(out, vec![AxisSelection::Indices(vec![0, 1])]);
    }

    #[test]
    fn test_value_range_needs_values() {
        let info = z_first();
        let err = resolve(
            &[Selector::named("cols", NamedSelector::Range(Some(0.0), None))],
            &[3, 2],
            &info,
        );
        assert!(matches!(err, Err(Error::MissingValues(1))));
    }

    #[test]
    fn test_named_column_and_unknown_axis() {
        let info = z_first();
        let out = resolve(&[Selector::named("cols", NamedSelector::Column("a".into()))], &[3, 2], &info).unwrap();
        assert_eq!(out[1], AxisSelection::Index(0));
        assert!(matches!(
            resolve(&[Selector::named("depth", NamedSelector::All)], &[3, 2], &info),
            Err(Error::UnknownAxis(_))
        ));
    }

    #[test]
    fn test_positional_after_named_is_an_error() {
        let info = z_first();
        let err = resolve(
            &[Selector::named("z", NamedSelector::Index(0)), Selector::Index(1)],
            &[3, 2],
            &info,
        );
        assert!(matches!(err, Err(Error::OrderingError)));

        let ok = resolve(
            &[Selector::Index(0), Selector::named("cols", NamedSelector::Slice(Some(0), Some(1)))],
            &[3, 2],
            &info,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_span_clamps() {
        assert_eq!(Span::all().range(4), 0..4);
        assert_eq!(Span::new(2, 10).range(4), 2..4);
        assert_eq!(Span::new(6, 10).range(4), 4..4);
    }
}
