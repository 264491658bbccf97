use serde::{Deserialize, Serialize};

/// A single ingredient line. An ingredient missing both `quantity` and
/// `unit` (e.g. "salt to taste") is not rejected — [`Recipe::filter_ingredients_into_notes`]
/// moves it into the recipe's `notes` instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeIngredient {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Recipe as produced by a scrape step, before it is reshaped into the
/// sink's wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub title: String,
    pub instructions: Vec<String>,
    pub prep_time: Option<String>,
    pub cook_time: Option<String>,
    pub total_time: Option<String>,
    pub servings: Option<String>,
    pub source_url: String,
    pub notes: Option<String>,
    pub ingredients: Vec<RecipeIngredient>,
}

impl Recipe {
    /// Mirrors the source's `_filter_ingredients_and_update_notes`: any
    /// ingredient missing *both* quantity and unit is pulled out of
    /// `ingredients` and folded into `notes` as a "to taste" addendum
    /// instead of failing the recipe. An ingredient with only one of the
    /// two missing (e.g. "2 pinches" with no named unit) is left alone.
    pub fn filter_ingredients_into_notes(&mut self) {
        let mut kept = Vec::with_capacity(self.ingredients.len());
        let mut moved_to_notes = Vec::new();
        for ingredient in self.ingredients.drain(..) {
            if ingredient.quantity.is_none() && ingredient.unit.is_none() {
                moved_to_notes.push(ingredient.name);
            } else {
                kept.push(ingredient);
            }
        }
        self.ingredients = kept;

        if moved_to_notes.is_empty() {
            return;
        }
        let additional = format!("Additional ingredients (to taste): {}", moved_to_notes.join(", "));
        self.notes = Some(match self.notes.take() {
            Some(existing) if !existing.is_empty() => format!("{existing}\n{additional}"),
            _ => additional,
        });
    }

    /// Reshapes into the strict wire schema the recipe-sink API expects.
    /// The sink renames `ingredients` to `recipe_ingredients` and
    /// `name` to `ingredient_name` — this is the Rust equivalent of the
    /// source's custom `model_dump()` override.
    pub fn to_sink_payload(&self, created_from_query: &str) -> RecipeSinkPayload {
        RecipeSinkPayload {
            title: self.title.clone(),
            instructions: self.instructions.clone(),
            prep_time: self.prep_time.clone(),
            cook_time: self.cook_time.clone(),
            total_time: self.total_time.clone(),
            servings: self.servings.clone(),
            source_url: self.source_url.clone(),
            notes: self.notes.clone(),
            recipe_ingredients: self
                .ingredients
                .iter()
                .map(|i| SinkIngredient {
                    ingredient_name: i.name.clone(),
                    quantity: i.quantity,
                    unit: i.unit.clone(),
                })
                .collect(),
            created_from_query: created_from_query.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkIngredient {
    pub ingredient_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Exact wire shape expected by the recipe-sink API. Field names here
/// are load-bearing, not cosmetic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeSinkPayload {
    pub title: String,
    pub instructions: Vec<String>,
    pub prep_time: Option<String>,
    pub cook_time: Option<String>,
    pub total_time: Option<String>,
    pub servings: Option<String>,
    pub source_url: String,
    pub notes: Option<String>,
    pub recipe_ingredients: Vec<SinkIngredient>,
    pub created_from_query: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingredient(name: &str, quantity: Option<f64>, unit: Option<&str>) -> RecipeIngredient {
        RecipeIngredient {
            name: name.to_string(),
            quantity,
            unit: unit.map(str::to_string),
        }
    }

    fn recipe(ingredients: Vec<RecipeIngredient>) -> Recipe {
        Recipe {
            title: "Test".to_string(),
            instructions: vec!["mix".to_string()],
            prep_time: None,
            cook_time: None,
            total_time: None,
            servings: None,
            source_url: "https://example.com".to_string(),
            notes: None,
            ingredients,
        }
    }

    #[test]
    fn empty_ingredients_is_left_alone() {
        let mut r = recipe(vec![]);
        r.filter_ingredients_into_notes();
        assert!(r.ingredients.is_empty());
        assert!(r.notes.is_none());
    }

    #[test]
    fn an_ingredient_with_only_a_unit_is_kept() {
        let mut r = recipe(vec![ingredient("flour", Some(2.0), Some("cup")), ingredient("pepper", None, Some("pinch"))]);
        r.filter_ingredients_into_notes();
        assert_eq!(r.ingredients.len(), 2);
        assert!(r.notes.is_none());
    }

    #[test]
    fn ingredients_missing_both_quantity_and_unit_move_into_notes() {
        let mut r = recipe(vec![
            ingredient("flour", Some(2.0), Some("cup")),
            ingredient("salt", None, None),
            ingredient("pepper", None, None),
        ]);
        r.filter_ingredients_into_notes();
        assert_eq!(r.ingredients.len(), 1);
        assert_eq!(r.ingredients[0].name, "flour");
        let notes = r.notes.expect("notes should be populated");
        assert!(notes.contains("salt"));
        assert!(notes.contains("pepper"));
    }

    #[test]
    fn moved_ingredients_append_to_existing_notes() {
        let mut r = recipe(vec![ingredient("salt", None, None)]);
        r.notes = Some("Serve warm.".to_string());
        r.filter_ingredients_into_notes();
        let notes = r.notes.expect("notes should be populated");
        assert!(notes.starts_with("Serve warm.\n"));
        assert!(notes.contains("salt"));
    }

    #[test]
    fn sink_payload_renames_fields() {
        let r = recipe(vec![ingredient("flour", Some(2.0), Some("cup"))]);
        let payload = r.to_sink_payload("chocolate cake");
        assert_eq!(payload.recipe_ingredients[0].ingredient_name, "flour");
        assert_eq!(payload.created_from_query, "chocolate cake");
    }
}
