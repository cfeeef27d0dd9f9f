/// Cart totals and fabrication quotes
///
/// All money is integer cents. Fractional cents produced by rates are
/// rounded up per line; tax is rounded half-up.

use serde::{Deserialize, Serialize};

use crate::models::service_order::{ServicePriority, ServiceType};

/// Store pricing knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingConfig {
    /// Tax rate in basis points (1800 = 18%)
    pub tax_rate_bps: i64,
    pub free_shipping_threshold_cents: i64,
    pub flat_shipping_cents: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate_bps: 1800,
            free_shipping_threshold_cents: 50_000,
            flat_shipping_cents: 4_900,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub shipping_cents: i64,
    pub total_cents: i64,
}

impl CartTotals {
    pub fn compute(subtotal_cents: i64, config: &PricingConfig) -> Self {
        let tax_cents = (subtotal_cents * config.tax_rate_bps + 5_000) / 10_000;
        let shipping_cents = if subtotal_cents == 0 || subtotal_cents >= config.free_shipping_threshold_cents {
            0
        } else {
            config.flat_shipping_cents
        };

        Self {
            subtotal_cents,
            tax_cents,
            shipping_cents,
            total_cents: subtotal_cents + tax_cents + shipping_cents,
        }
    }

    /// Totals for `(unit_price_cents, quantity)` lines
    pub fn from_lines<I>(lines: I, config: &PricingConfig) -> Self
    where
        I: IntoIterator<Item = (i64, i32)>,
    {
        let subtotal = lines
            .into_iter()
            .map(|(price, qty)| price * i64::from(qty))
            .sum();
        Self::compute(subtotal, config)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuoteError {
    #[error("quantity must be between 1 and {MAX_QUOTE_QUANTITY}")]
    InvalidQuantity,

    #[error("{0} is required for this service")]
    MissingGeometry(&'static str),

    #[error("{0} must be a positive number")]
    InvalidGeometry(&'static str),

    #[error("{field} must not exceed {max}")]
    GeometryTooLarge { field: &'static str, max: f64 },

    #[error("quote total is out of range")]
    TotalOutOfRange,
}

pub const MAX_QUOTE_QUANTITY: i32 = 1000;

/// One cubic metre
pub const MAX_VOLUME_CM3: f64 = 1_000_000.0;
/// Ten square metres
pub const MAX_AREA_CM2: f64 = 100_000.0;
/// One kilometre of cut path
pub const MAX_CUT_LENGTH_CM: f64 = 100_000.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub service_type: ServiceType,
    pub material: String,
    pub quantity: i32,
    pub volume_cm3: Option<f64>,
    pub area_cm2: Option<f64>,
    pub cut_length_cm: Option<f64>,
    #[serde(default)]
    pub priority: ServicePriority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub service_type: ServiceType,
    pub material: String,
    pub quantity: i32,
    pub unit_material_cents: i64,
    pub unit_machine_cents: i64,
    pub setup_fee_cents: i64,
    pub subtotal_cents: i64,
    pub rush_surcharge_cents: i64,
    pub total_cents: i64,
    pub estimated_hours: f64,
}

const PRINT_MACHINE_CENTS_PER_HOUR: f64 = 300.0;
const PRINT_CM3_PER_HOUR: f64 = 10.0;
const PRINT_SETUP_CENTS: i64 = 200;

const LASER_CUT_CENTS_PER_CM: f64 = 1.0;
const LASER_CM_PER_MINUTE: f64 = 60.0;
const LASER_MACHINE_CENTS_PER_HOUR: f64 = 1200.0;
const LASER_SETUP_CENTS: i64 = 300;

const CNC_MACHINE_CENTS_PER_HOUR: f64 = 1500.0;
const CNC_CM3_PER_HOUR: f64 = 5.0;
const CNC_SETUP_CENTS: i64 = 2500;

/// Material rate in cents per cm³ (printing, CNC) or cm² (laser)
pub fn material_rate(service_type: ServiceType, material: &str) -> f64 {
    let material = material.to_ascii_lowercase();
    match service_type {
        ServiceType::Printing3d => match material.as_str() {
            "pla" => 5.0,
            "petg" | "abs" => 6.0,
            "tpu" => 8.0,
            "resin" => 15.0,
            _ => 8.0,
        },
        ServiceType::LaserCutting => match material.as_str() {
            "wood" | "mdf" => 1.0,
            _ => 2.0,
        },
        ServiceType::CncMachining => match material.as_str() {
            "wood" => 3.0,
            "aluminum" => 20.0,
            "brass" => 28.0,
            "steel" => 30.0,
            _ => 20.0,
        },
    }
}

fn required(value: Option<f64>, name: &'static str, max: f64) -> Result<f64, QuoteError> {
    let value = value.ok_or(QuoteError::MissingGeometry(name))?;
    if !value.is_finite() || value <= 0.0 {
        return Err(QuoteError::InvalidGeometry(name));
    }
    if value > max {
        return Err(QuoteError::GeometryTooLarge { field: name, max });
    }
    Ok(value)
}

/// Rounds up to a whole cent, ignoring float noise below 1e-9
fn cents(amount: f64) -> i64 {
    (amount - 1e-9).ceil().max(0.0) as i64
}

/// Prices a fabrication job
///
/// # Example
///
/// ```
/// use makrx_shared::models::service_order::{ServicePriority, ServiceType};
/// use makrx_shared::pricing::{quote, QuoteRequest};
///
/// let q = quote(&QuoteRequest {
///     service_type: ServiceType::Printing3d,
///     material: "PLA".to_string(),
///     quantity: 2,
///     volume_cm3: Some(20.0),
///     area_cm2: None,
///     cut_length_cm: None,
///     priority: ServicePriority::Normal,
/// }).unwrap();
///
/// // (100 material + 600 machine) x 2 + 200 setup
/// assert_eq!(q.total_cents, 1600);
/// ```
pub fn quote(request: &QuoteRequest) -> Result<Quote, QuoteError> {
    if !(1..=MAX_QUOTE_QUANTITY).contains(&request.quantity) {
        return Err(QuoteError::InvalidQuantity);
    }

    let rate = material_rate(request.service_type, &request.material);

    let (unit_material_cents, unit_machine_cents, unit_hours, setup_fee_cents) = match request.service_type {
        ServiceType::Printing3d => {
            let volume = required(request.volume_cm3, "volume_cm3", MAX_VOLUME_CM3)?;
            let hours = volume / PRINT_CM3_PER_HOUR;
            (
                cents(volume * rate),
                cents(hours * PRINT_MACHINE_CENTS_PER_HOUR),
                hours,
                PRINT_SETUP_CENTS,
            )
        }
        ServiceType::LaserCutting => {
            let area = required(request.area_cm2, "area_cm2", MAX_AREA_CM2)?;
            let cut_length = required(request.cut_length_cm, "cut_length_cm", MAX_CUT_LENGTH_CM)?;
            let minutes = cut_length / LASER_CM_PER_MINUTE;
            (
                cents(area * rate),
                cents(cut_length * LASER_CUT_CENTS_PER_CM)
                    + cents(minutes * LASER_MACHINE_CENTS_PER_HOUR / 60.0),
                minutes / 60.0,
                LASER_SETUP_CENTS,
            )
        }
        ServiceType::CncMachining => {
            let volume = required(request.volume_cm3, "volume_cm3", MAX_VOLUME_CM3)?;
            let hours = volume / CNC_CM3_PER_HOUR;
            (
                cents(volume * rate),
                cents(hours * CNC_MACHINE_CENTS_PER_HOUR),
                hours,
                CNC_SETUP_CENTS,
            )
        }
    };

    let quantity = i64::from(request.quantity);
    let subtotal_cents = unit_material_cents
        .checked_add(unit_machine_cents)
        .and_then(|unit| unit.checked_mul(quantity))
        .and_then(|lines| lines.checked_add(setup_fee_cents))
        .ok_or(QuoteError::TotalOutOfRange)?;
    let rush_surcharge_cents = match request.priority {
        ServicePriority::Rush => subtotal_cents / 2 + subtotal_cents % 2,
        ServicePriority::Normal => 0,
    };
    let total_cents = subtotal_cents
        .checked_add(rush_surcharge_cents)
        .ok_or(QuoteError::TotalOutOfRange)?;

    Ok(Quote {
        service_type: request.service_type,
        material: request.material.clone(),
        quantity: request.quantity,
        unit_material_cents,
        unit_machine_cents,
        setup_fee_cents,
        subtotal_cents,
        rush_surcharge_cents,
        total_cents,
        estimated_hours: unit_hours * request.quantity as f64,
    })
}
