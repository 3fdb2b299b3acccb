// Environmental impact figures derived from total energy. Constants are part of the public contract.

/// Wh per kWh.
pub const WH_PER_KWH: f64 = 1000.0;
/// World-average grid intensity, kg CO2 per kWh.
pub const CARBON_FACTOR_KG_PER_KWH: f64 = 0.475;
/// Water used per kWh generated, litres.
pub const WATER_FACTOR_L_PER_KWH: f64 = 1.8;

pub fn energy_kwh(total_energy_wh: f64) -> f64 {
    total_energy_wh / WH_PER_KWH
}

/// Grams of CO2 for `total_energy_wh`.
pub fn carbon_footprint(total_energy_wh: f64) -> f64 {
    energy_kwh(total_energy_wh) * CARBON_FACTOR_KG_PER_KWH * 1000.0
}

/// Millilitres of water for `total_energy_wh`.
pub fn water_consumption(total_energy_wh: f64) -> f64 {
    energy_kwh(total_energy_wh) * WATER_FACTOR_L_PER_KWH * 1000.0
}
