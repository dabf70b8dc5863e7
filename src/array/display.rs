//! Human-readable summary of an array's metadata

use super::MetaArray;
use std::fmt;

/// Format like C's `%g`: six significant digits, trailing zeros trimmed
pub(crate) fn format_g(v: f64) -> String {
    if v.is_nan() {
        return "nan".into();
    }
    if v.is_infinite() {
        return if v > 0.0 { "inf" } else { "-inf" }.into();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0" } else { "0" }.into();
    }
    let sci = format!("{v:.5e}");
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    if !(-4..6).contains(&exp) {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{sign}{:02}", trim_zeros(mantissa), exp.abs())
    } else {
        let decimals = (5 - exp).max(0) as usize;
        trim_zeros(&format!("{v:.decimals$}")).to_string()
    }
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

impl fmt::Display for MetaArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MetaArray {} {:?}", self.dtype(), self.shape())?;

        let ndim = self.ndim();
        let titles: Vec<String> = (0..ndim)
            .map(|i| {
                let spec = self.info[i].spec();
                let mut title = match &spec.name {
                    Some(name) => format!("\"{name}\""),
                    None => i.to_string(),
                };
                if let Some(units) = &spec.units {
                    title.push_str(&format!(" ({units})"));
                }
                title
            })
            .collect();
        let width = titles.iter().map(String::len).max().unwrap_or(0);

        for (i, title) in titles.iter().enumerate() {
            let spec = self.info[i].spec();
            let len = self.shape()[i];
            write!(f, "{title:<width$}  [{len:>5}] :")?;
            if let Some(values) = spec.values.as_ref().and_then(|v| v.to_f64_vec().ok()) {
                match values.as_slice() {
                    [] => write!(f, "  values: []")?,
                    [only] => write!(f, "  values: [{}]", format_g(*only))?,
                    [first, .., last] => write!(
                        f,
                        "  values: [{} ... {}] (step {})",
                        format_g(*first),
                        format_g(*last),
                        format_g((last - first) / (values.len() - 1) as f64)
                    )?,
                }
            }
            if let Some(cols) = &spec.cols {
                let names: Vec<String> = cols
                    .iter()
                    .map(|c| {
                        let mut s = c.name.as_ref().map(|n| n.to_string()).unwrap_or_default();
                        if let Some(units) = &c.units {
                            s.push_str(&format!(" ({units})"));
                        }
                        s
                    })
                    .collect();
                write!(f, " columns: [{}]", names.join(", "))?;
            }
            writeln!(f)?;
        }
        write!(f, "{}", self.info[ndim].to_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AxisSpec, Buffer, ColumnSpec, DType};

    #[test]
    fn test_format_g() {
        assert_eq!(format_g(0.0), "0");
        assert_eq!(format_g(1.0), "1");
        assert_eq!(format_g(0.5), "0.5");
        assert_eq!(format_g(123456.0), "123456");
        assert_eq!(format_g(1234567.0), "1.23457e+06");
        assert_eq!(format_g(0.0001), "0.0001");
        assert_eq!(format_g(0.00001), "1e-05");
        assert_eq!(format_g(-2.25), "-2.25");
        assert_eq!(format_g(1.0 / 3.0), "0.333333");
    }

    #[test]
    fn test_pretty_info() {
        let a = MetaArray::new(
            Buffer::zeros(DType::F64, &[3, 2]),
            vec![
                AxisSpec::named("time")
                    .with_units("s")
                    .with_values(Buffer::from_elements(vec![0.0, 0.5, 1.0]))
                    .into(),
                AxisSpec::default()
                    .with_cols([ColumnSpec::named("V").with_units("V"), ColumnSpec::named("I")])
                    .into(),
            ],
        )
        .unwrap();
        let text = a.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "MetaArray float64 [3, 2]");
        assert!(lines[1].starts_with("\"time\" (s)"));
        assert!(lines[1].ends_with("values: [0 ... 1] (step 0.5)"));
        assert!(lines[2].ends_with("columns: [V (V), I]"));
        assert_eq!(lines[3], "{}");
    }
}
