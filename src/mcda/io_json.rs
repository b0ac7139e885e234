// Reader for the JSON performance tableaux.

use crate::mcda::*;
use bipolar_outranking::builder::TableauBuilder;
use std::str::FromStr;

pub fn read_tableau(
    path: &str,
    na_warning_threshold: Option<Decimal>,
) -> McdaResult<PerformanceTableau> {
    info!("Attempting to read tableau file {:?}", path);
    let contents = fs::read_to_string(path).context(OpeningJsonSnafu { path })?;
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    parse_tableau(&js, na_warning_threshold)
}

pub fn parse_tableau(
    js: &JSValue,
    na_warning_threshold: Option<Decimal>,
) -> McdaResult<PerformanceTableau> {
    let name = match js.get("name") {
        Some(JSValue::String(s)) => s.clone(),
        None | Some(JSValue::Null) => "tableau".to_string(),
        Some(x) => whatever!("The name of the tableau should be a string, got {:?}", x),
    };
    let na = match js.get("NA") {
        Some(x) => read_decimal(x)?,
        None => DEFAULT_NA,
    };
    let mut builder = TableauBuilder::new(&name).na(na);
    if let Some(t) = na_warning_threshold {
        builder = builder.na_warning_threshold(t);
    }

    for (id, a) in read_object(js, "actions")? {
        let mut action = Action::new(id);
        action.name = read_opt_string(a, "name")?;
        action.comment = read_opt_string(a, "comment")?;
        builder.add_action(action).context(OutrankingSnafu {})?;
    }

    for (id, c) in read_object(js, "criteria")? {
        let criterion = read_criterion(id, c)?;
        debug!("criterion: {:?}", criterion);
        builder.add_criterion(criterion).context(OutrankingSnafu {})?;
    }

    for (g, row) in read_object(js, "evaluation")? {
        let row = match row {
            JSValue::Object(m) => m,
            x => whatever!("The evaluations of criterion {} should be a mapping, got {:?}", g, x),
        };
        for (a, v) in row {
            builder
                .set_evaluation(g, a, read_evaluation(v, na)?)
                .context(OutrankingSnafu {})?;
        }
    }

    let tableau = builder.build().context(OutrankingSnafu {})?;
    info!(
        "read tableau {}: {} actions, {} criteria",
        tableau.name(),
        tableau.order(),
        tableau.criteria().len()
    );
    Ok(tableau)
}

fn read_object<'a>(js: &'a JSValue, key: &str) -> McdaResult<&'a JSMap<String, JSValue>> {
    match js.get(key) {
        Some(JSValue::Object(m)) => Ok(m),
        Some(x) => whatever!("The key {} should be a mapping, got {:?}", key, x),
        None => whatever!("Missing key {} in the tableau", key),
    }
}

fn read_opt_string(js: &JSValue, key: &str) -> McdaResult<Option<String>> {
    match js.get(key) {
        Some(JSValue::String(s)) => Ok(Some(s.clone())),
        None | Some(JSValue::Null) => Ok(None),
        Some(x) => whatever!("The key {} should be a string, got {:?}", key, x),
    }
}

/// Numbers are read from their decimal representation, without going through binary floats.
pub fn read_decimal(js: &JSValue) -> McdaResult<Decimal> {
    match js {
        JSValue::Number(n) => decimal_of_number(n),
        x => whatever!("Expected a number, got {:?}", x),
    }
}

pub fn decimal_of_number(n: &serde_json::Number) -> McdaResult<Decimal> {
    let s = n.to_string();
    match Decimal::from_str(&s).or_else(|_| Decimal::from_scientific(&s)) {
        Ok(d) => Ok(d),
        Err(e) => whatever!("Could not read the number {}: {}", s, e),
    }
}

fn read_evaluation(js: &JSValue, na: Decimal) -> McdaResult<Evaluation> {
    match js {
        JSValue::Null => Ok(Evaluation::Missing),
        JSValue::String(s) if s == "NA" => Ok(Evaluation::Missing),
        JSValue::Number(n) => {
            let v = decimal_of_number(n)?;
            if v == na {
                Ok(Evaluation::Missing)
            } else {
                Ok(Evaluation::Value(v))
            }
        }
        x => whatever!("Could not understand the evaluation {:?}", x),
    }
}

fn read_threshold(js: &JSValue) -> McdaResult<AffineThreshold> {
    match js {
        JSValue::Number(_) => Ok(AffineThreshold::constant(read_decimal(js)?)),
        JSValue::Array(l) if l.len() == 2 => Ok(AffineThreshold::new(
            read_decimal(&l[0])?,
            read_decimal(&l[1])?,
        )),
        x => whatever!("A threshold is a pair [intercept, slope], got {:?}", x),
    }
}

fn threshold_kind(key: &str) -> McdaResult<ThresholdKind> {
    match ThresholdKind::ALL.iter().find(|k| k.to_string() == key) {
        Some(k) => Ok(*k),
        None => whatever!("Unknown threshold {:?}", key),
    }
}

fn read_criterion(id: &str, js: &JSValue) -> McdaResult<Criterion> {
    let weight = match js.get("weight") {
        Some(w) => read_decimal(w)?,
        None => whatever!("Criterion {}: missing weight", id),
    };
    let scale = match js.get("scale") {
        Some(JSValue::Array(l)) if l.len() == 2 => (read_decimal(&l[0])?, read_decimal(&l[1])?),
        x => whatever!("Criterion {}: the scale should be a pair [low, high], got {:?}", id, x),
    };
    let mut criterion = Criterion::new(id, weight, scale);
    if let Some(name) = read_opt_string(js, "name")? {
        criterion = criterion.with_name(&name);
    }

    // A negative weight reverses the direction when the tableau is built, so it
    // only goes with an implicit direction.
    let explicit = read_opt_string(js, "preferenceDirection")?;
    if explicit.is_some() && weight < Decimal::ZERO {
        whatever!(
            "Criterion {}: a negative weight cannot be combined with preferenceDirection {:?}",
            id,
            explicit
        );
    }
    let direction = match explicit.as_deref() {
        Some("max") => PreferenceDirection::Max,
        Some("min") => PreferenceDirection::Min,
        Some(x) => whatever!("Criterion {}: unknown preference direction {:?}", id, x),
        None => {
            if weight >= Decimal::ZERO {
                warn!(
                    "criterion {}: no preference direction, assuming max",
                    id
                );
            }
            PreferenceDirection::Max
        }
    };
    criterion = criterion.with_direction(direction);

    match js.get("thresholds") {
        None | Some(JSValue::Null) => {}
        Some(JSValue::Object(m)) => {
            for (key, t) in m {
                criterion = criterion.with_threshold(threshold_kind(key)?, read_threshold(t)?);
            }
        }
        Some(x) => whatever!("Criterion {}: the thresholds should be a mapping, got {:?}", id, x),
    }
    Ok(criterion)
}
