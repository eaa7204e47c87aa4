use async_trait::async_trait;
use std::collections::HashMap;
use workcore::{
    FailureSignal, HandlerError, HandlerMetadata, HandlerOutcome, ParameterDefinition, Results,
    Value, WorkItemContext, WorkItemHandler,
};

/// Points at which a licence is suspended
pub const SUSPENSION_POINTS: f64 = 20.0;

struct DriverRecord {
    id: &'static str,
    name: &'static str,
    state: &'static str,
    city: &'static str,
    points: f64,
    license_expiration: &'static str,
    valid_license: bool,
}

const DRIVERS: &[DriverRecord] = &[
    DriverRecord {
        id: "12345",
        name: "Arthur",
        state: "SP",
        city: "Campinas",
        points: 13.0,
        license_expiration: "2099-12-31",
        valid_license: true,
    },
    DriverRecord {
        id: "1234",
        name: "Paul",
        state: "SP",
        city: "Jundiai",
        points: 5.0,
        license_expiration: "2020-01-01",
        valid_license: false,
    },
];

impl DriverRecord {
    fn to_value(&self) -> Value {
        let mut driver = HashMap::new();
        driver.insert("id".to_string(), Value::from(self.id));
        driver.insert("name".to_string(), Value::from(self.name));
        driver.insert("state".to_string(), Value::from(self.state));
        driver.insert("city".to_string(), Value::from(self.city));
        driver.insert("points".to_string(), Value::from(self.points));
        driver.insert("licenseExpiration".to_string(), Value::from(self.license_expiration));
        driver.insert("validLicense".to_string(), Value::from(self.valid_license));
        Value::Object(driver)
    }
}

/// Looks a driver up and reports whether the licence is still valid.
pub struct LicenseValidationHandler;

#[async_trait]
impl WorkItemHandler for LicenseValidationHandler {
    fn work_item_type(&self) -> &str {
        "traffic.license-validation"
    }

    async fn execute(&self, ctx: WorkItemContext) -> Result<HandlerOutcome, HandlerError> {
        // Ids arrive as strings from JSON bodies but numbers are accepted too
        let driver_id = match ctx.require_parameter("driverId")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => format!("{}", n),
            other => {
                return Err(HandlerError::InvalidParameterType {
                    field: "driverId".to_string(),
                    expected: "string".to_string(),
                    actual: other.type_name().to_string(),
                })
            }
        };

        let Some(record) = DRIVERS.iter().find(|d| d.id == driver_id) else {
            return Ok(HandlerOutcome::failed(FailureSignal::abort(
                "driver_not_found",
                format!("No driver with id {}", driver_id),
            )));
        };

        ctx.events.info(format!(
            "Driver {} licence valid: {}",
            record.id, record.valid_license
        ));

        let mut results = Results::new();
        results.insert("driver".to_string(), record.to_value());
        Ok(HandlerOutcome::completed(results))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Validates a driver's licence".to_string(),
            category: "traffic".to_string(),
            parameters: vec![ParameterDefinition::required("driverId", "Driver identifier")],
        }
    }
}

/// Fine owed for a speeding excess, as (amount, points)
pub fn speeding_fine(speed_limit: f64, actual_speed: f64) -> Option<(f64, f64)> {
    let excess = actual_speed - speed_limit;
    if excess >= 30.0 {
        Some((1000.0, 7.0))
    } else if excess >= 10.0 {
        Some((500.0, 3.0))
    } else {
        None
    }
}

/// Decides the fine for a violation and whether the licence is suspended.
///
/// Drivers without a valid licence get no decision: the response is null.
pub struct ViolationDecisionHandler;

#[async_trait]
impl WorkItemHandler for ViolationDecisionHandler {
    fn work_item_type(&self) -> &str {
        "traffic.violation-decision"
    }

    async fn execute(&self, ctx: WorkItemContext) -> Result<HandlerOutcome, HandlerError> {
        let driver = ctx.require_parameter("driver")?;
        let violation = ctx.require_parameter("violation")?;

        let mut results = Results::new();
        if driver.get("validLicense").and_then(Value::as_bool) != Some(true) {
            ctx.events.warn("Licence is not valid, skipping decision");
            results.insert("trafficViolationResponse".to_string(), Value::Null);
            return Ok(HandlerOutcome::completed(results));
        }

        let kind = violation.get("type").and_then(Value::as_str).unwrap_or("speed");
        if kind != "speed" {
            return Ok(HandlerOutcome::failed(FailureSignal::abort(
                "unsupported_violation",
                format!("Unsupported violation type: {}", kind),
            )));
        }

        let speed_limit = number(violation, "speedLimit")?;
        let actual_speed = number(violation, "actualSpeed")?;
        let points = driver.get("points").and_then(Value::as_f64).unwrap_or(0.0);

        let fine = speeding_fine(speed_limit, actual_speed);
        let fine_points = fine.map(|(_, p)| p).unwrap_or(0.0);
        let suspended = points + fine_points >= SUSPENSION_POINTS;

        let mut response = HashMap::new();
        response.insert(
            "Fine".to_string(),
            match fine {
                Some((amount, points)) => {
                    let mut f = HashMap::new();
                    f.insert("Amount".to_string(), Value::from(amount));
                    f.insert("Points".to_string(), Value::from(points));
                    Value::Object(f)
                }
                None => Value::Null,
            },
        );
        response.insert(
            "Suspended".to_string(),
            Value::from(if suspended { "Yes" } else { "No" }),
        );

        tracing::info!(
            work_item_id = %ctx.item.id,
            excess = actual_speed - speed_limit,
            suspended,
            "Violation decided"
        );

        results.insert("trafficViolationResponse".to_string(), Value::Object(response));
        Ok(HandlerOutcome::completed(results))
    }

    fn metadata(&self) -> HandlerMetadata {
        HandlerMetadata {
            description: "Decides fine and suspension for a traffic violation".to_string(),
            category: "traffic".to_string(),
            parameters: vec![
                ParameterDefinition::required("driver", "Validated driver record"),
                ParameterDefinition::required("violation", "{type, speedLimit, actualSpeed}"),
            ],
        }
    }
}

fn number(object: &Value, field: &str) -> Result<f64, HandlerError> {
    let value = object
        .get(field)
        .ok_or_else(|| HandlerError::MissingParameter(format!("violation.{}", field)))?;
    value.as_f64().ok_or_else(|| HandlerError::InvalidParameterType {
        field: format!("violation.{}", field),
        expected: "number".to_string(),
        actual: value.type_name().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fine_table() {
        assert_eq!(speeding_fine(100.0, 105.0), None);
        assert_eq!(speeding_fine(100.0, 110.0), Some((500.0, 3.0)));
        assert_eq!(speeding_fine(100.0, 129.0), Some((500.0, 3.0)));
        assert_eq!(speeding_fine(100.0, 130.0), Some((1000.0, 7.0)));
    }
}
