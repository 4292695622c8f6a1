//! Country to region mapping used when back-filling categorical metadata.

use super::UNKNOWN_CATEGORY;

const NORTH_AMERICA: &[&str] = &["United States", "Canada", "Bermuda"];

const LATIN_AMERICA: &[&str] = &[
    "Mexico", "Brazil", "Argentina", "Chile", "Colombia", "Peru", "Uruguay", "Panama",
    "Cayman Islands", "Puerto Rico",
];

const EUROPE: &[&str] = &[
    "United Kingdom", "Ireland", "Germany", "France", "Netherlands", "Belgium", "Luxembourg",
    "Switzerland", "Austria", "Italy", "Spain", "Portugal", "Sweden", "Norway", "Denmark",
    "Finland", "Iceland", "Poland", "Czech Republic", "Hungary", "Greece", "Jersey",
    "Guernsey", "Isle of Man", "Monaco", "Cyprus", "Malta", "Russia", "Turkey",
];

const ASIA: &[&str] = &[
    "China", "Hong Kong", "Japan", "South Korea", "Taiwan", "Singapore", "India", "Indonesia",
    "Malaysia", "Thailand", "Philippines", "Vietnam", "Macau", "Kazakhstan",
];

const MIDDLE_EAST: &[&str] = &[
    "Israel", "United Arab Emirates", "Saudi Arabia", "Qatar", "Kuwait", "Jordan",
];

const AFRICA: &[&str] = &["South Africa", "Egypt", "Nigeria", "Kenya", "Morocco", "Mauritius"];

const OCEANIA: &[&str] = &["Australia", "New Zealand"];

/// Region a country belongs to, or `-` when unknown
pub fn region_of(country: &str) -> &'static str {
    let country = country.trim();
    let groups: [(&'static str, &[&str]); 7] = [
        ("North America", NORTH_AMERICA),
        ("Latin America", LATIN_AMERICA),
        ("Europe", EUROPE),
        ("Asia", ASIA),
        ("Middle East", MIDDLE_EAST),
        ("Africa", AFRICA),
        ("Oceania", OCEANIA),
    ];

    groups
        .iter()
        .find(|(_, countries)| countries.iter().any(|c| c.eq_ignore_ascii_case(country)))
        .map(|(region, _)| *region)
        .unwrap_or(UNKNOWN_CATEGORY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_countries() {
        assert_eq!(region_of("United States"), "North America");
        assert_eq!(region_of("germany"), "Europe");
        assert_eq!(region_of("Japan"), "Asia");
    }

    #[test]
    fn test_unknown_country_is_placeholder() {
        assert_eq!(region_of("Atlantis"), "-");
        assert_eq!(region_of(""), "-");
    }
}
