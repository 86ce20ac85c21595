//! ISO 3166-1 alpha-2 codes for the countries the catalog lists tours in.

/// English short name for a country code, case-insensitive.
pub fn country_name(code: &str) -> Option<&'static str> {
    let code = code.trim();
    if code.len() != 2 {
        return None;
    }
    let name = match code.to_ascii_uppercase().as_str() {
        // East Africa
        "UG" => "Uganda",
        "KE" => "Kenya",
        "TZ" => "Tanzania",
        "RW" => "Rwanda",
        "BI" => "Burundi",
        "SS" => "South Sudan",
        "ET" => "Ethiopia",
        "SO" => "Somalia",
        "DJ" => "Djibouti",
        "ER" => "Eritrea",
        "CD" => "Democratic Republic of the Congo",
        // Southern Africa
        "ZA" => "South Africa",
        "NA" => "Namibia",
        "BW" => "Botswana",
        "ZW" => "Zimbabwe",
        "ZM" => "Zambia",
        "MW" => "Malawi",
        "MZ" => "Mozambique",
        "MG" => "Madagascar",
        "MU" => "Mauritius",
        "SC" => "Seychelles",
        "LS" => "Lesotho",
        "SZ" => "Eswatini",
        "AO" => "Angola",
        // West, Central and North Africa
        "NG" => "Nigeria",
        "GH" => "Ghana",
        "SN" => "Senegal",
        "CI" => "Ivory Coast",
        "CM" => "Cameroon",
        "GA" => "Gabon",
        "CG" => "Republic of the Congo",
        "MA" => "Morocco",
        "EG" => "Egypt",
        "TN" => "Tunisia",
        "DZ" => "Algeria",
        // Elsewhere
        "AE" => "United Arab Emirates",
        "IN" => "India",
        "TH" => "Thailand",
        "ID" => "Indonesia",
        "CN" => "China",
        "JP" => "Japan",
        "GB" => "United Kingdom",
        "FR" => "France",
        "DE" => "Germany",
        "IT" => "Italy",
        "ES" => "Spain",
        "US" => "United States",
        "CA" => "Canada",
        "BR" => "Brazil",
        "AU" => "Australia",
        _ => return None,
    };
    Some(name)
}
