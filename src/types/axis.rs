//! Per-axis metadata

use super::{Buffer, Value};
use crate::error::{Error, Result};
use crate::index::AxisSelection;
use std::collections::BTreeMap;
use std::fmt;

/// Axis or column name: a string or a tuple of scalars
#[derive(Debug, Clone, PartialEq)]
pub enum Name {
    Str(String),
    Tuple(Vec<Value>),
}

impl Name {
    pub fn to_value(&self) -> Value {
        match self {
            Name::Str(s) => Value::Str(s.clone()),
            Name::Tuple(items) => Value::Tuple(items.clone()),
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(Name::Str(s.clone())),
            Value::Tuple(items) => Some(Name::Tuple(items.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Name::Str(s) => f.write_str(s),
            Name::Tuple(items) => write!(f, "{}", Value::Tuple(items.clone())),
        }
    }
}

impl From<&str> for Name {
    fn from(v: &str) -> Self {
        Name::Str(v.to_string())
    }
}

impl From<String> for Name {
    fn from(v: String) -> Self {
        Name::Str(v)
    }
}

impl From<Vec<Value>> for Name {
    fn from(v: Vec<Value>) -> Self {
        Name::Tuple(v)
    }
}

/// Reference to an axis by position or by name
#[derive(Debug, Clone, PartialEq)]
pub enum AxisRef {
    Index(usize),
    Name(Name),
}

impl fmt::Display for AxisRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AxisRef::Index(i) => write!(f, "{i}"),
            AxisRef::Name(n) => write!(f, "{n}"),
        }
    }
}

impl From<usize> for AxisRef {
    fn from(v: usize) -> Self {
        AxisRef::Index(v)
    }
}

impl From<&str> for AxisRef {
    fn from(v: &str) -> Self {
        AxisRef::Name(v.into())
    }
}

impl From<String> for AxisRef {
    fn from(v: String) -> Self {
        AxisRef::Name(v.into())
    }
}

impl From<Name> for AxisRef {
    fn from(v: Name) -> Self {
        AxisRef::Name(v)
    }
}

/// Description of one column carried along an axis
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnSpec {
    pub name: Option<Name>,
    pub units: Option<String>,
    /// Other keys, e.g. `title`
    pub extra: BTreeMap<String, Value>,
}

impl ColumnSpec {
    pub fn named(name: impl Into<Name>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn to_value(&self) -> Value {
        let mut d = self.extra.clone();
        if let Some(name) = &self.name {
            d.insert("name".into(), name.to_value());
        }
        if let Some(units) = &self.units {
            d.insert("units".into(), Value::Str(units.clone()));
        }
        Value::Dict(d)
    }

    /// Accepts a dict, or a bare name
    pub fn from_value(value: &Value) -> Result<Self> {
        if let Some(name) = Name::from_value(value) {
            return Ok(ColumnSpec::named(name));
        }
        let d = value
            .as_dict()
            .ok_or_else(|| Error::InvalidInfo(format!("column must be a dict, got {}", value.kind())))?;
        let mut col = ColumnSpec::default();
        for (key, v) in d {
            match key.as_str() {
                "name" => col.name = Some(name_field(v)?),
                "units" => col.units = Some(units_field(v)?),
                _ => {
                    col.extra.insert(key.clone(), v.clone());
                }
            }
        }
        Ok(col)
    }
}

/// Description of one axis, or of the whole array for the trailing slot
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AxisSpec {
    pub name: Option<Name>,
    pub units: Option<String>,
    /// One value per position, 1-D
    pub values: Option<Buffer>,
    /// One column per position
    pub cols: Option<Vec<ColumnSpec>>,
    /// Other keys, e.g. `title`
    pub extra: BTreeMap<String, Value>,
}

static EMPTY_SPEC: AxisSpec = AxisSpec {
    name: None,
    units: None,
    values: None,
    cols: None,
    extra: BTreeMap::new(),
};

impl AxisSpec {
    pub fn named(name: impl Into<Name>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }

    pub fn with_values(mut self, values: impl Into<Buffer>) -> Self {
        self.values = Some(values.into());
        self
    }

    pub fn with_cols(mut self, cols: impl IntoIterator<Item = ColumnSpec>) -> Self {
        self.cols = Some(cols.into_iter().collect());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.units.is_none()
            && self.values.is_none()
            && self.cols.is_none()
            && self.extra.is_empty()
    }

    /// Read a key generically (`name`, `units`, `values`, `cols` or an extra key)
    pub fn key(&self, key: &str) -> Option<Value> {
        match key {
            "name" => self.name.as_ref().map(Name::to_value),
            "units" => self.units.clone().map(Value::Str),
            "values" => self.values.clone().map(Value::Array),
            "cols" => self
                .cols
                .as_ref()
                .map(|c| Value::List(c.iter().map(ColumnSpec::to_value).collect())),
            other => self.extra.get(other).cloned(),
        }
    }

    /// Position of the first column named `name`
    pub fn column_position(&self, name: &Name) -> Option<usize> {
        self.cols
            .as_ref()?
            .iter()
            .position(|c| c.name.as_ref() == Some(name))
    }

    /// Spec restricted to the selected positions
    ///
    /// Only `values` and `cols` depend on position; a spec without them is
    /// returned as is.
    pub fn slice(&self, sel: &AxisSelection) -> AxisSpec {
        let mut out = self.clone();
        if self.values.is_none() && self.cols.is_none() {
            return out;
        }
        if let Some(values) = &self.values {
            out.values = Some(values.select(std::slice::from_ref(sel)));
        }
        if let Some(cols) = &self.cols {
            out.cols = Some(sel.positions().into_iter().map(|p| cols[p].clone()).collect());
        }
        out
    }

    pub fn to_value(&self) -> Value {
        Value::Dict(self.to_dict())
    }

    /// Every field as a dict entry, extras alongside the named fields
    pub fn to_dict(&self) -> BTreeMap<String, Value> {
        let mut d = self.extra.clone();
        if let Some(name) = &self.name {
            d.insert("name".into(), name.to_value());
        }
        if let Some(units) = &self.units {
            d.insert("units".into(), Value::Str(units.clone()));
        }
        if let Some(values) = &self.values {
            d.insert("values".into(), Value::Array(values.clone()));
        }
        if let Some(cols) = &self.cols {
            d.insert(
                "cols".into(),
                Value::List(cols.iter().map(ColumnSpec::to_value).collect()),
            );
        }
        d
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let d = value.as_dict().ok_or_else(|| {
            Error::InvalidInfo(format!("axis specification must be a dict, got {}", value.kind()))
        })?;
        let mut spec = AxisSpec::default();
        for (key, v) in d {
            match key.as_str() {
                "name" => spec.name = Some(name_field(v)?),
                "units" => spec.units = Some(units_field(v)?),
                "values" => spec.values = Some(values_field(v)?),
                "cols" => {
                    let items = v.as_seq().ok_or_else(|| {
                        Error::InvalidInfo(format!("cols must be a list, got {}", v.kind()))
                    })?;
                    spec.cols = Some(
                        items
                            .iter()
                            .map(ColumnSpec::from_value)
                            .collect::<Result<Vec<_>>>()?,
                    );
                }
                _ => {
                    spec.extra.insert(key.clone(), v.clone());
                }
            }
        }
        Ok(spec)
    }
}

fn name_field(v: &Value) -> Result<Name> {
    Name::from_value(v)
        .ok_or_else(|| Error::InvalidInfo(format!("name must be a str or tuple, got {}", v.kind())))
}

fn units_field(v: &Value) -> Result<String> {
    v.as_str()
        .map(str::to_string)
        .ok_or_else(|| Error::InvalidInfo(format!("units must be a str, got {}", v.kind())))
}

fn values_field(v: &Value) -> Result<Buffer> {
    match v {
        Value::Array(a) if a.ndim() == 1 => Ok(a.clone()),
        Value::Array(a) => Err(Error::InvalidInfo(format!(
            "axis values must be 1-D, got {} dimensions",
            a.ndim()
        ))),
        Value::List(items) | Value::Tuple(items) => Buffer::from_values(items)
            .ok_or_else(|| Error::InvalidInfo("axis values must be numeric".into())),
        other => Err(Error::InvalidInfo(format!(
            "axis values must be a list or array, got {}",
            other.kind()
        ))),
    }
}

/// Metadata slot for one axis (or the trailing whole-array slot)
#[derive(Debug, Clone, Default)]
pub enum AxisInfo {
    #[default]
    Empty,
    Described(AxisSpec),
}

impl AxisInfo {
    /// The spec, or an empty one
    pub fn spec(&self) -> &AxisSpec {
        match self {
            AxisInfo::Empty => &EMPTY_SPEC,
            AxisInfo::Described(spec) => spec,
        }
    }

    /// Mutable spec, describing an empty slot on first use
    pub fn spec_mut(&mut self) -> &mut AxisSpec {
        if let AxisInfo::Empty = self {
            *self = AxisInfo::Described(AxisSpec::default());
        }
        match self {
            AxisInfo::Described(spec) => spec,
            AxisInfo::Empty => unreachable!("slot described above"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.spec().is_empty()
    }

    pub fn to_value(&self) -> Value {
        self.spec().to_value()
    }

    /// `None` and `{}` both decode to `Empty`
    pub fn from_value(value: &Value) -> Result<Self> {
        if value.is_none() {
            return Ok(AxisInfo::Empty);
        }
        Ok(AxisInfo::from(AxisSpec::from_value(value)?))
    }
}

impl From<AxisSpec> for AxisInfo {
    fn from(spec: AxisSpec) -> Self {
        if spec.is_empty() {
            AxisInfo::Empty
        } else {
            AxisInfo::Described(spec)
        }
    }
}

impl PartialEq for AxisInfo {
    fn eq(&self, other: &Self) -> bool {
        self.spec() == other.spec()
    }
}

/// Index of the first of the `ndim` axes matching `axis`
pub fn axis_index(info: &[AxisInfo], ndim: usize, axis: &AxisRef) -> Result<usize> {
    match axis {
        AxisRef::Index(i) if *i < ndim => Ok(*i),
        AxisRef::Index(i) => Err(Error::UnknownAxis(i.to_string())),
        AxisRef::Name(name) => info
            .iter()
            .take(ndim)
            .position(|ax| ax.spec().name.as_ref() == Some(name))
            .ok_or_else(|| Error::UnknownAxis(name.to_string())),
    }
}

/// Position of column `name` on `axis`
pub fn column_index(info: &[AxisInfo], axis: usize, name: &Name) -> Result<usize> {
    info.get(axis)
        .and_then(|ax| ax.spec().column_position(name))
        .ok_or_else(|| Error::UnknownColumn {
            axis,
            column: name.to_string(),
        })
}
