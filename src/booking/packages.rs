//! Package naming and the price calculator.

use serde::{Deserialize, Serialize};

pub const BASIC_PACKAGE_NAME: &str = "Basic Detailing";
pub const CONCOURS_PACKAGE_NAME: &str = "Custom Concours Package";

/// Base price of the basic wash and hand dry every booking includes
pub const BASE_PRICE: f64 = 79.0;

/// Add-on modules a customer can toggle in the calculator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModuleSelection {
    pub exterior: bool,
    pub interior: bool,
    pub paint_correction: bool,
    pub coating: bool,
    pub engine_bay: bool,
    pub headlights: bool,
}

impl ModuleSelection {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Selected module slugs in calculator order
    pub fn slugs(&self) -> Vec<&'static str> {
        MODULE_PRICES
            .iter()
            .filter(|(module, _)| self.has(*module))
            .map(|(module, _)| module.slug())
            .collect()
    }

    pub fn has(&self, module: Module) -> bool {
        match module {
            Module::Exterior => self.exterior,
            Module::Interior => self.interior,
            Module::PaintCorrection => self.paint_correction,
            Module::Coating => self.coating,
            Module::EngineBay => self.engine_bay,
            Module::Headlights => self.headlights,
        }
    }

    /// Build a selection from module slugs; unknown slugs are returned as errors
    pub fn from_slugs<S: AsRef<str>>(slugs: &[S]) -> Result<Self, String> {
        let mut selection = Self::default();
        for slug in slugs {
            match slug.as_ref().parse::<Module>()? {
                Module::Exterior => selection.exterior = true,
                Module::Interior => selection.interior = true,
                Module::PaintCorrection => selection.paint_correction = true,
                Module::Coating => selection.coating = true,
                Module::EngineBay => selection.engine_bay = true,
                Module::Headlights => selection.headlights = true,
            }
        }
        Ok(selection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Module {
    Exterior,
    Interior,
    PaintCorrection,
    Coating,
    EngineBay,
    Headlights,
}

impl Module {
    pub fn slug(&self) -> &'static str {
        match self {
            Module::Exterior => "exterior",
            Module::Interior => "interior",
            Module::PaintCorrection => "paint_correction",
            Module::Coating => "coating",
            Module::EngineBay => "engine_bay",
            Module::Headlights => "headlights",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Module::Exterior => "Exterior Hand Wash & Wax",
            Module::Interior => "Interior Deep Clean",
            Module::PaintCorrection => "Paint Correction",
            Module::Coating => "Ceramic Coating",
            Module::EngineBay => "Engine Bay Detail",
            Module::Headlights => "Headlight Restoration",
        }
    }
}

impl std::str::FromStr for Module {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "exterior" => Ok(Self::Exterior),
            "interior" => Ok(Self::Interior),
            "paint_correction" | "correction" => Ok(Self::PaintCorrection),
            "coating" | "ceramic" => Ok(Self::Coating),
            "engine_bay" | "engine" => Ok(Self::EngineBay),
            "headlights" => Ok(Self::Headlights),
            _ => Err(format!("Unknown service module: {}", s)),
        }
    }
}

/// Module prices before the vehicle size multiplier
pub const MODULE_PRICES: [(Module, f64); 6] = [
    (Module::Exterior, 60.0),
    (Module::Interior, 90.0),
    (Module::PaintCorrection, 350.0),
    (Module::Coating, 650.0),
    (Module::EngineBay, 45.0),
    (Module::Headlights, 70.0),
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleSize {
    Compact,
    #[default]
    Sedan,
    Suv,
    Truck,
    Van,
}

impl VehicleSize {
    pub fn multiplier(&self) -> f64 {
        match self {
            VehicleSize::Compact => 0.9,
            VehicleSize::Sedan => 1.0,
            VehicleSize::Suv => 1.2,
            VehicleSize::Truck => 1.3,
            VehicleSize::Van => 1.4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VehicleSize::Compact => "compact",
            VehicleSize::Sedan => "sedan",
            VehicleSize::Suv => "suv",
            VehicleSize::Truck => "truck",
            VehicleSize::Van => "van",
        }
    }
}

impl std::str::FromStr for VehicleSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "sedan" | "coupe" => Ok(Self::Sedan),
            "suv" | "crossover" => Ok(Self::Suv),
            "truck" | "pickup" => Ok(Self::Truck),
            "van" | "minivan" => Ok(Self::Van),
            _ => Err(format!("Unknown vehicle size: {}", s)),
        }
    }
}

/// Marketing name for a module selection.
///
/// Rules are checked top to bottom; the first match wins.
pub fn get_package_name(selection: &ModuleSelection) -> &'static str {
    if selection.coating && selection.interior {
        CONCOURS_PACKAGE_NAME
    } else if selection.coating {
        "Ceramic Protection Package"
    } else if selection.paint_correction {
        "Paint Correction Package"
    } else if selection.interior && selection.exterior {
        "Full Detail Package"
    } else if selection.interior {
        "Interior Detail Package"
    } else if selection.exterior {
        "Exterior Detail Package"
    } else if selection.engine_bay || selection.headlights {
        "Enhanced Detailing"
    } else {
        BASIC_PACKAGE_NAME
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub slug: &'static str,
    pub label: &'static str,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub package_name: &'static str,
    pub vehicle_size: VehicleSize,
    pub line_items: Vec<LineItem>,
    pub total_price: f64,
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Price a selection for a vehicle: base price plus modules, times the size multiplier.
pub fn quote(selection: &ModuleSelection, vehicle_size: VehicleSize) -> Quote {
    let multiplier = vehicle_size.multiplier();

    let mut line_items = vec![LineItem {
        slug: "base",
        label: BASIC_PACKAGE_NAME,
        price: round_cents(BASE_PRICE * multiplier),
    }];
    line_items.extend(
        MODULE_PRICES
            .iter()
            .filter(|(module, _)| selection.has(*module))
            .map(|(module, price)| LineItem {
                slug: module.slug(),
                label: module.label(),
                price: round_cents(price * multiplier),
            }),
    );

    let total_price = round_cents(line_items.iter().map(|item| item.price).sum());

    Quote {
        package_name: get_package_name(selection),
        vehicle_size,
        line_items,
        total_price,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_selection_is_basic() {
        assert_eq!(get_package_name(&ModuleSelection::default()), "Basic Detailing");
    }

    #[test]
    fn test_coating_and_interior_is_concours() {
        let selection = ModuleSelection {
            coating: true,
            interior: true,
            ..Default::default()
        };
        assert_eq!(get_package_name(&selection), "Custom Concours Package");

        // Extra modules do not demote the package
        let everything = ModuleSelection {
            exterior: true,
            interior: true,
            paint_correction: true,
            coating: true,
            engine_bay: true,
            headlights: true,
        };
        assert_eq!(get_package_name(&everything), CONCOURS_PACKAGE_NAME);
    }

    #[test]
    fn test_package_name_rules() {
        let only = |f: fn(&mut ModuleSelection)| {
            let mut s = ModuleSelection::default();
            f(&mut s);
            get_package_name(&s)
        };
        assert_eq!(only(|s| s.coating = true), "Ceramic Protection Package");
        assert_eq!(only(|s| s.paint_correction = true), "Paint Correction Package");
        assert_eq!(only(|s| s.interior = true), "Interior Detail Package");
        assert_eq!(only(|s| s.exterior = true), "Exterior Detail Package");
        assert_eq!(only(|s| s.headlights = true), "Enhanced Detailing");
        assert_eq!(
            only(|s| {
                s.interior = true;
                s.exterior = true;
            }),
            "Full Detail Package"
        );
    }

    #[test]
    fn test_selection_deserializes_from_partial_json() {
        let selection: ModuleSelection = serde_json::from_str(r#"{"coating":true,"interior":true}"#).unwrap();
        assert!(selection.coating && selection.interior && !selection.exterior);

        let empty: ModuleSelection = serde_json::from_str("{}").unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_from_slugs() {
        let selection = ModuleSelection::from_slugs(&["interior", "ceramic", "engine-bay"]).unwrap();
        assert_eq!(selection.slugs(), vec!["interior", "coating", "engine_bay"]);
        assert!(ModuleSelection::from_slugs(&["teleport"]).is_err());
    }

    #[test]
    fn test_quote_basic_sedan() {
        let q = quote(&ModuleSelection::default(), VehicleSize::Sedan);
        assert_eq!(q.package_name, BASIC_PACKAGE_NAME);
        assert_eq!(q.line_items.len(), 1);
        assert_eq!(q.total_price, BASE_PRICE);
    }

    #[test]
    fn test_quote_applies_size_multiplier() {
        let selection = ModuleSelection {
            interior: true,
            exterior: true,
            ..Default::default()
        };
        let sedan = quote(&selection, VehicleSize::Sedan);
        assert_eq!(sedan.total_price, 79.0 + 60.0 + 90.0);

        let suv = quote(&selection, VehicleSize::Suv);
        assert_eq!(suv.total_price, 274.8);
        assert_eq!(suv.package_name, "Full Detail Package");
        assert!(suv.total_price > 0.0);
    }

    #[test]
    fn test_vehicle_size_parse() {
        assert_eq!("SUV".parse::<VehicleSize>().unwrap(), VehicleSize::Suv);
        assert_eq!("pickup".parse::<VehicleSize>().unwrap(), VehicleSize::Truck);
        assert!("boat".parse::<VehicleSize>().is_err());
    }
}
