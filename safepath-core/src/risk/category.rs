//! Unified incident taxonomy with severity weights for pedestrian safety

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Homicide,
    SexualAssault,
    Robbery,
    AggravatedAssault,
    SimpleAssault,
    Kidnapping,
    Arson,
    Burglary,
    MotorVehicleTheft,
    TheftLarceny,
    Vandalism,
    DrugOffense,
    WeaponsViolation,
    Dui,
    Trespass,
    Fraud,
    DisorderlyConduct,
    Harassment,
    TrafficIncident,
    Other,
}

/// Keyword fragments matched in table order; the first hit wins.
const KEYWORDS: &[(&[&str], Category)] = &[
    (&["homicide", "murder", "manslaughter"], Category::Homicide),
    (
        &["sexual assault", "rape", "fondling", "sex offense", "sexual abuse"],
        Category::SexualAssault,
    ),
    (&["robbery"], Category::Robbery),
    (
        &["aggravated assault", "assault 1st", "assault-agg"],
        Category::AggravatedAssault,
    ),
    (
        &["simple assault", "assault 3rd", "assault-simple", "assault-"],
        Category::SimpleAssault,
    ),
    (&["kidnap", "abduction"], Category::Kidnapping),
    (&["arson"], Category::Arson),
    (&["burglary", "breaking and entering", "b&e"], Category::Burglary),
    (
        &["motor vehicle theft", "auto theft", "stolen vehicle"],
        Category::MotorVehicleTheft,
    ),
    (&["theft", "larceny", "stealing", "shoplifting"], Category::TheftLarceny),
    (
        &["vandalism", "destruction", "damage", "criminal mischief"],
        Category::Vandalism,
    ),
    (
        &["drug", "narcotic", "marijuana", "controlled substance"],
        Category::DrugOffense,
    ),
    (&["weapon", "firearm", "gun"], Category::WeaponsViolation),
    (&["dui", "dwi", "driving under", "driving while"], Category::Dui),
    (&["trespass"], Category::Trespass),
    (
        &["fraud", "forgery", "counterfeit", "identity theft"],
        Category::Fraud,
    ),
    (&["disorderly", "disturbance", "peace"], Category::DisorderlyConduct),
    (&["harassment", "stalking", "intimidation"], Category::Harassment),
    (&["crash", "accident", "traffic"], Category::TrafficIncident),
];

impl Category {
    pub const ALL: [Category; 20] = [
        Category::Homicide,
        Category::SexualAssault,
        Category::Robbery,
        Category::AggravatedAssault,
        Category::SimpleAssault,
        Category::Kidnapping,
        Category::Arson,
        Category::Burglary,
        Category::MotorVehicleTheft,
        Category::TheftLarceny,
        Category::Vandalism,
        Category::DrugOffense,
        Category::WeaponsViolation,
        Category::Dui,
        Category::Trespass,
        Category::Fraud,
        Category::DisorderlyConduct,
        Category::Harassment,
        Category::TrafficIncident,
        Category::Other,
    ];

    /// Severity weight in 0..=1; violent categories weigh more
    pub fn severity(self) -> f64 {
        match self {
            Category::Homicide => 1.0,
            Category::SexualAssault => 0.95,
            Category::Robbery | Category::Kidnapping => 0.9,
            Category::AggravatedAssault => 0.85,
            Category::Arson => 0.7,
            Category::SimpleAssault => 0.6,
            Category::WeaponsViolation | Category::Harassment => 0.5,
            Category::Burglary => 0.4,
            Category::MotorVehicleTheft => 0.35,
            Category::TheftLarceny | Category::DrugOffense => 0.3,
            Category::Dui => 0.25,
            Category::Vandalism | Category::Fraud | Category::Other => 0.2,
            Category::Trespass | Category::DisorderlyConduct => 0.15,
            Category::TrafficIncident => 0.1,
        }
    }

    pub fn is_violent(self) -> bool {
        matches!(
            self,
            Category::Homicide
                | Category::SexualAssault
                | Category::Robbery
                | Category::AggravatedAssault
                | Category::SimpleAssault
                | Category::Kidnapping
                | Category::Arson
                | Category::Harassment
        )
    }

    /// Highest severity in the table, the anchor of the risk score scale
    pub fn max_severity() -> f64 {
        Category::ALL
            .iter()
            .map(|c| c.severity())
            .fold(0.0, f64::max)
    }

    /// Maps a free-text incident description onto the taxonomy
    pub fn classify(description: &str) -> Category {
        let description = description.trim().to_lowercase();
        if description.is_empty() {
            return Category::Other;
        }
        KEYWORDS
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|kw| description.contains(kw)))
            .map_or(Category::Other, |(_, category)| *category)
    }

    pub fn label(self) -> &'static str {
        match self {
            Category::Homicide => "Homicide",
            Category::SexualAssault => "Sexual Assault",
            Category::Robbery => "Robbery",
            Category::AggravatedAssault => "Aggravated Assault",
            Category::SimpleAssault => "Simple Assault",
            Category::Kidnapping => "Kidnapping",
            Category::Arson => "Arson",
            Category::Burglary => "Burglary",
            Category::MotorVehicleTheft => "Motor Vehicle Theft",
            Category::TheftLarceny => "Theft/Larceny",
            Category::Vandalism => "Vandalism",
            Category::DrugOffense => "Drug Offense",
            Category::WeaponsViolation => "Weapons Violation",
            Category::Dui => "DUI",
            Category::Trespass => "Trespass",
            Category::Fraud => "Fraud",
            Category::DisorderlyConduct => "Disorderly Conduct",
            Category::Harassment => "Harassment",
            Category::TrafficIncident => "Traffic Incident",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
