use std::fmt;

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::Timer;

/// Dosage attached to every recommendation; the model is not asked for one.
pub const DEFAULT_DOSAGE: &str = "Apply as per manufacturer's instructions";

/// Most recommendations returned per request.
pub const MAX_RECOMMENDATIONS: usize = 5;

/// A sensor reading or lab value; the UI may send either numbers or text.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reading {
    Number(f64),
    Text(String),
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Number(n) => write!(f, "{}", n),
            Reading::Text(s) => f.write_str(s.trim()),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FertilizerRequest {
    pub pest_identified: String,
    pub temperature: Reading,
    pub humidity: Reading,
    pub moisture: Reading,
    pub soil_type: String,
    pub nitrogen: Reading,
    pub phosphorus: Reading,
    pub potassium: Reading,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Recommendation {
    pub name: String,
    pub description: String,
    pub dosage: String,
}

/// A remote text-generation model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Builds the agronomist instruction sent to the text model.
pub fn build_prompt(req: &FertilizerRequest) -> String {
    format!(
        "You are an expert agronomist. Based on the given inputs, recommend the **top 5 fertilizers**:

**Input Data:**
- **Pest Identified:** {pest}
- **Environmental Factors:**
  - Temperature: {temperature}°C
  - Humidity: {humidity}%
  - Moisture: {moisture}%
  - Soil Type: {soil}
- **Soil Nutrient Levels:**
  - Nitrogen: {nitrogen}
  - Phosphorus: {phosphorus}
  - Potassium: {potassium}

**Task:**
- Provide a list of the **top 5 fertilizers** suitable for this scenario.
- Include **one short reason** for why each fertilizer is recommended.
- Format response as:
  1️⃣ **Fertilizer Name** – Short Reason.
  2️⃣ **Fertilizer Name** – Short Reason.
  3️⃣ **Fertilizer Name** – Short Reason.
  4️⃣ **Fertilizer Name** – Short Reason.
  5️⃣ **Fertilizer Name** – Short Reason.

Please generate only the 5 bullet points in this format.
",
        pest = req.pest_identified.trim(),
        temperature = req.temperature,
        humidity = req.humidity,
        moisture = req.moisture,
        soil = req.soil_type.trim(),
        nitrogen = req.nitrogen,
        phosphorus = req.phosphorus,
        potassium = req.potassium,
    )
}

/// Characters allowed before the bold name: numbering, keycap emoji parts
/// and list bullets.
fn is_ordinal_char(c: char) -> bool {
    c.is_ascii_digit()
        || c.is_whitespace()
        || matches!(c, '.' | ')' | '#' | '*' | '-' | '•' | '\u{FE0F}' | '\u{20E3}')
}

fn is_dash(c: char) -> bool {
    matches!(c, '–' | '—' | '-')
}

/// Drops a `1.`, `1)` or keycap numbering that leaked inside the bold
/// markers, leaving names such as `10-26-26 NPK` intact.
fn strip_ordinal(name: &str) -> &str {
    let digits = name.trim_start_matches(|c: char| c.is_ascii_digit());
    if digits.len() == name.len() {
        return name;
    }

    let rest = digits.trim_start_matches(|c: char| matches!(c, '.' | ')' | '\u{FE0F}' | '\u{20E3}'));
    if rest.len() != digits.len() && rest.starts_with(char::is_whitespace) {
        rest.trim_start()
    } else {
        name
    }
}

/// Parses one `1️⃣ **Name** – Reason.` line.
pub fn parse_line(line: &str) -> Option<Recommendation> {
    let line = line.trim();

    let open = line.find("**")?;
    if !line[..open].chars().all(is_ordinal_char) {
        return None;
    }

    let rest = &line[open + 2..];
    let close = rest.find("**")?;
    let name = strip_ordinal(rest[..close].trim()).trim_end_matches(':').trim();

    let after = rest[close + 2..].trim_start();
    let mut chars = after.chars();
    if !chars.next().map(is_dash).unwrap_or(false) {
        return None;
    }
    let reason = chars.as_str().replace("**", "");
    let reason = reason.trim();

    if name.is_empty() || reason.is_empty() {
        return None;
    }

    Some(Recommendation {
        name: name.to_owned(),
        description: reason.to_owned(),
        dosage: DEFAULT_DOSAGE.to_owned(),
    })
}

/// Extracts up to five recommendations; lines that do not follow the
/// requested format are dropped.
pub fn parse_recommendations(text: &str) -> Vec<Recommendation> {
    let mut recommendations = Vec::new();

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        match parse_line(line) {
            Some(rec) if recommendations.len() < MAX_RECOMMENDATIONS => recommendations.push(rec),
            Some(_) => break,
            None => debug!("Skipping unrecognised line: {:?}", line),
        }
    }

    recommendations
}

/// Delegates fertilizer selection to a text model.
pub struct FertilizerRecommender {
    generator: Box<dyn TextGenerator>,
}

impl FertilizerRecommender {
    pub fn new(generator: Box<dyn TextGenerator>) -> Self {
        FertilizerRecommender { generator }
    }

    pub async fn recommend(&self, req: &FertilizerRequest) -> Result<Vec<Recommendation>> {
        let prompt = build_prompt(req);

        let mut t = Timer::start("Generating fertilizer recommendations");
        let text = self.generator.generate(&prompt).await?;
        t.stop();

        let recommendations = parse_recommendations(&text);
        if recommendations.len() < MAX_RECOMMENDATIONS {
            warn!(
                "Only {} of {} recommendations could be parsed",
                recommendations.len(),
                MAX_RECOMMENDATIONS
            );
        }
        info!(
            "Recommended {} fertilizers for '{}'",
            recommendations.len(),
            req.pest_identified
        );

        Ok(recommendations)
    }
}
