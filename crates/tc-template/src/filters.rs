//! Filters and helper functions registered on the template environment

use minijinja::value::{Kwargs, Value};
use minijinja::{Error, ErrorKind};

fn as_number(value: &Value) -> Option<f64> {
    f64::try_from(value.clone())
        .ok()
        .or_else(|| value.as_i64().map(|i| i as f64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
}

fn is_blank(value: &Value) -> bool {
    value.is_undefined() || value.is_none() || value.as_str() == Some("")
}

/// `| float(default)`: fails without a default when the input isn't numeric
pub fn to_float(value: Value, default: Option<Value>) -> Result<Value, Error> {
    let parsed = if is_blank(&value) { None } else { as_number(&value) };
    match (parsed, default) {
        (Some(f), _) => Ok(Value::from(f)),
        (None, Some(d)) => Ok(as_number(&d).map(Value::from).unwrap_or(d)),
        (None, None) => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot convert {value} to float"),
        )),
    }
}

/// `| int(default)`: floats and numeric strings are truncated
pub fn to_int(value: Value, default: Option<Value>) -> Result<Value, Error> {
    let parsed = if is_blank(&value) {
        None
    } else {
        value.as_i64().or_else(|| as_number(&value).map(|f| f as i64))
    };
    match (parsed, default) {
        (Some(i), _) => Ok(Value::from(i)),
        (None, Some(d)) => Ok(d
            .as_i64()
            .or_else(|| as_number(&d).map(|f| f as i64))
            .map(Value::from)
            .unwrap_or(d)),
        (None, None) => Err(Error::new(
            ErrorKind::InvalidOperation,
            format!("cannot convert {value} to int"),
        )),
    }
}

pub fn to_bool(value: Value, default: Option<bool>) -> bool {
    if value.is_undefined() || value.is_none() {
        return default.unwrap_or(false);
    }
    if let Ok(b) = bool::try_from(value.clone()) {
        return b;
    }
    if let Some(s) = value.as_str() {
        return matches!(
            s.trim().to_lowercase().as_str(),
            "true" | "yes" | "on" | "1" | "enable" | "enabled"
        );
    }
    value.is_true()
}

/// `| round(precision, method='common'|'ceil'|'floor'|'half')`
pub fn round_filter(value: f64, precision: Option<i32>, kwargs: Kwargs) -> Result<f64, Error> {
    let method: Option<String> = kwargs.get("method")?;
    kwargs.assert_all_used()?;

    let multiplier = 10_f64.powi(precision.unwrap_or(0));
    let scaled = value * multiplier;
    let rounded = match method.as_deref() {
        Some("ceil") => scaled.ceil(),
        Some("floor") => scaled.floor(),
        Some("half") => (scaled * 2.0).round() / 2.0,
        None | Some("common") => scaled.round(),
        Some(other) => {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                format!("unknown rounding method '{other}'"),
            ))
        }
    };
    Ok(rounded / multiplier)
}

pub fn is_number(value: Value) -> bool {
    value.as_i64().is_some() || f64::try_from(value).is_ok()
}

/// `iif(condition, if_true, if_false, if_none)`
pub fn iif(
    condition: Value,
    if_true: Option<Value>,
    if_false: Option<Value>,
    if_none: Option<Value>,
) -> Value {
    if condition.is_none() || condition.is_undefined() {
        if_none
            .or_else(|| if_false.clone())
            .unwrap_or(Value::from(false))
    } else if condition.is_true() {
        if_true.unwrap_or(Value::from(true))
    } else {
        if_false.unwrap_or(Value::from(false))
    }
}

/// Smallest numeric argument; accepts either a list or several arguments
pub fn min_fn(args: &[Value]) -> Value {
    numbers(args)
        .into_iter()
        .reduce(f64::min)
        .map(number_value)
        .unwrap_or(Value::UNDEFINED)
}

pub fn max_fn(args: &[Value]) -> Value {
    numbers(args)
        .into_iter()
        .reduce(f64::max)
        .map(number_value)
        .unwrap_or(Value::UNDEFINED)
}

fn numbers(args: &[Value]) -> Vec<f64> {
    let items: Vec<Value> = match args {
        [single] if single.as_str().is_none() => match single.try_iter() {
            Ok(iter) => iter.collect(),
            Err(_) => vec![single.clone()],
        },
        _ => args.to_vec(),
    };
    items.iter().filter_map(as_number).collect()
}

fn number_value(f: f64) -> Value {
    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Value::from(f as i64)
    } else {
        Value::from(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_float() {
        assert_eq!(to_float(Value::from("21.5"), None).unwrap(), Value::from(21.5));
        assert_eq!(to_float(Value::from(3), None).unwrap(), Value::from(3.0));
        assert_eq!(
            to_float(Value::from("warm"), Some(Value::from(0))).unwrap(),
            Value::from(0.0)
        );
        assert!(to_float(Value::from("warm"), None).is_err());
        assert!(to_float(Value::UNDEFINED, None).is_err());
    }

    #[test]
    fn test_to_int() {
        assert_eq!(to_int(Value::from("42"), None).unwrap(), Value::from(42));
        assert_eq!(to_int(Value::from(19.9), None).unwrap(), Value::from(19));
        assert_eq!(to_int(Value::from(""), Some(Value::from(5))).unwrap(), Value::from(5));
        assert!(to_int(Value::from("n/a"), None).is_err());
    }

    #[test]
    fn test_to_bool() {
        assert!(to_bool(Value::from("on"), None));
        assert!(to_bool(Value::from("Yes"), None));
        assert!(!to_bool(Value::from("off"), None));
        assert!(to_bool(Value::UNDEFINED, Some(true)));
        assert!(to_bool(Value::from(2), None));
    }

    #[test]
    fn test_iif() {
        assert_eq!(
            iif(Value::from(true), Some(Value::from("a")), Some(Value::from("b")), None),
            Value::from("a")
        );
        assert_eq!(
            iif(Value::from(0), Some(Value::from("a")), Some(Value::from("b")), None),
            Value::from("b")
        );
        assert_eq!(
            iif(Value::from(()), None, None, Some(Value::from("n"))),
            Value::from("n")
        );
    }

    #[test]
    fn test_min_max() {
        let list = [Value::from(vec![3, 1, 2])];
        assert_eq!(min_fn(&list), Value::from(1));
        assert_eq!(max_fn(&list), Value::from(3));

        let args = [Value::from(2.5), Value::from("7")];
        assert_eq!(max_fn(&args), Value::from(7));
        assert!(min_fn(&[]).is_undefined());
    }

    #[test]
    fn test_is_number() {
        assert!(is_number(Value::from(1)));
        assert!(is_number(Value::from(1.5)));
        assert!(!is_number(Value::from("1")));
    }
}
