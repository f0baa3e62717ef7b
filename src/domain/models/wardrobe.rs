#[cfg(test)]
#[path = "wardrobe_test.rs"]
mod tests;

use serde_derive::Deserialize;
use serde_derive::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WardrobeItem {
    pub name: String,
    pub category: String,
    pub color: String,
    pub season: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outfit {
    pub name: String,
    pub items: Vec<String>,
    pub occasion: String,
    pub season: String,
    pub description: String,
}

impl Outfit {
    pub fn format_list(outfits: &[Outfit]) -> String {
        if outfits.is_empty() {
            return "No outfit suggestions came back. Try adding more wardrobe items.".to_string();
        }

        let formatted = outfits
            .iter()
            .enumerate()
            .map(|(idx, outfit)| {
                let n = idx + 1;
                return format!(
                    "{n}. {} ({}, {})\n   Items: {}\n   {}",
                    outfit.name,
                    outfit.occasion,
                    outfit.season,
                    outfit.items.join(", "),
                    outfit.description
                );
            })
            .collect::<Vec<String>>();

        return formatted.join("\n\n");
    }
}
