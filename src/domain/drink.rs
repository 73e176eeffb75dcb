use serde::{Deserialize, Serialize};

const UNKNOWN: &str = "không rõ";

/// Visual and usage traits of a drink, extracted from a free-text description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrinkTraits {
    #[serde(default)]
    pub drink_type: Option<String>,
    #[serde(default)]
    pub drink_color: Option<String>,
    #[serde(default)]
    pub container_type: Option<String>,
    #[serde(default)]
    pub ingredients: Option<String>,
    #[serde(default)]
    pub topping: Option<String>,
    #[serde(default)]
    pub suitable_for: Option<String>,
}

impl DrinkTraits {
    /// Builds the sentence searched against the product description index.
    pub fn to_search_query(&self) -> String {
        let mut query = format!(
            "Sự kết hợp từ các thành phần như {}, tạo nên một đồ uống có màu {}, thường được phục vụ trong {}.",
            field(&self.ingredients),
            field(&self.drink_color),
            field(&self.container_type),
        );

        if let Some(topping) = self.topping.as_deref().filter(|t| has_topping(t)) {
            query.push_str(&format!(" Trên bề mặt được phủ {}", topping.trim()));
        }

        query.push_str(&format!(". Lý tưởng cho {}", field(&self.suitable_for)));
        query
    }
}

fn field(value: &Option<String>) -> &str {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(UNKNOWN)
}

fn has_topping(value: &str) -> bool {
    let normalized = value.trim().to_lowercase();
    !(normalized.is_empty()
        || normalized == "none"
        || normalized == "null"
        || normalized.starts_with("không có"))
}
