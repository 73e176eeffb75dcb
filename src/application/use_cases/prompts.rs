use crate::domain::customer::{CallerProfile, PurchaseRecord};

pub(crate) const ANONYMOUS_CUSTOMER: &str = "Khách hàng ẩn danh";
pub(crate) const INSUFFICIENT_INFO: &str = "Xin lỗi, tôi không có đủ thông tin về vấn đề này.";

const SHOP_ROLE: &str = "You are the assistant of a drinks shop. You advise customers about drinks, answer questions about the shop, and explain the nutritional content of products. Reply in the customer's language (Vietnamese unless they write in another language).";

pub(crate) fn build_classification_prompt(query: &str, history: &str) -> String {
    format!(
        r#"Decide how the customer's question should be answered.

Question: "{query}"
Recent conversation:
{history}

Two methods are available:
1. Database (SQL): the question needs exact structured data from the catalog: aggregation (sum, average, count), filtering, sorting, comparison, statistics or listing. Examples: "Liệt kê 3 sản phẩm bán chạy nhất", "Có bao nhiêu đơn hàng hôm qua?", "Trà sữa nào giá dưới 50 nghìn?", "Mặt hàng nào bán nhiều nhất?".
2. Semantic search: descriptive, explanatory, conversational or open questions about products, the shop or general topics. Examples: "Trà sữa trân châu đường đen có vị thế nào?", "Gợi ý đồ uống giải nhiệt mùa hè", "Thành phần dinh dưỡng của món này là gì?".

Always choose semantic search for greetings and thanks, emotional remarks, very general requests, and questions about you or about how to use the assistant. When the intent is ambiguous, choose semantic search.

Answer "true" for Database (SQL) or "false" for semantic search. Reply with that single word and nothing else."#,
        query = query,
        history = or_none(history),
    )
}

pub(crate) fn build_sql_generation_prompt(question: &str, schema: &str) -> String {
    format!(
        r#"Translate the customer's question into one SQLite query.

Question: "{question}"

Database schema:
{schema}

Rules:
1. Use only tables and columns that appear in the schema.
2. Write exactly one read-only SELECT statement.
3. Never use DROP, DELETE, UPDATE, INSERT, ALTER or TRUNCATE.
4. Use WHERE for filters, ORDER BY for sorting and JOIN when several tables are needed.
5. Do not assume data that is not in the tables.
6. When the question is in Vietnamese, widen text filters with the English equivalent of product or category keywords (and the reverse) using OR ... LIKE, without changing the meaning of the question.
   Example for "cà phê nào có giá dưới 25000":
   SELECT p.Name, p.Price FROM Product p JOIN Categories c ON p.Categories_id = c.Id WHERE (c.Name LIKE '%Cà phê%' OR c.Name LIKE '%Coffee%') AND p.Price < 25000

Output only the SQL, with no explanation, no Markdown code block and no comments."#,
        question = question,
        schema = schema,
    )
}

pub(crate) fn build_structured_answer_prompt(
    query: &str,
    rows: &str,
    history: &str,
    profile: Option<&CallerProfile>,
    purchases: &[PurchaseRecord],
) -> String {
    format!(
        r#"{role}

Customer: {customer}
Question:
{query}

Query results:
{rows}

Recent conversation:
{history}
{purchases}
Instructions:
1. Answer the current question directly, based on the query results.
2. Use the purchase history only when the customer asks for a recommendation, is undecided, or the results alone cannot answer. Otherwise do not mention it.
3. Be concise, natural and friendly.
4. Treat the query results as the main source; earlier conversation only supports them.
5. Stay consistent with previous answers and do not repeat their structure.
6. Present several options as a clear list.
7. When the results only name a product or lack details, invite the customer to ask about price, ingredients or ratings.
8. For statistics, explain what the numbers mean and comment on them.
9. Never mention product or category ids.
10. If there is not enough information, say exactly: "{insufficient}""#,
        role = SHOP_ROLE,
        customer = describe_customer(profile),
        query = query,
        rows = rows,
        history = or_none(history),
        purchases = format_purchases(purchases),
        insufficient = INSUFFICIENT_INFO,
    )
}

pub(crate) fn build_semantic_answer_prompt(
    query: &str,
    passages: &str,
    history: &str,
    profile: Option<&CallerProfile>,
    purchases: &[PurchaseRecord],
) -> String {
    format!(
        r#"{role}

Customer: {customer}
Question:
{query}

Relevant catalog information:
{passages}

Recent conversation:
{history}
{purchases}
Instructions:
1. Answer the current question directly, using the catalog information above.
2. Use the purchase history only when the customer asks for a recommendation, is undecided, or the question cannot be answered without their preferences. Never mention it for unrelated questions such as opening hours or a named product.
3. Be concise, natural and friendly.
4. Use only information present in the catalog information and the conversation.
5. Stay consistent with previous answers and do not repeat their structure.
6. When advising on a drink, give its price, ingredients and health benefits when known.
7. When advising on a store, give its address and opening hours when known.
8. Never mention product or category ids.
9. If there is not enough information, say exactly: "{insufficient}""#,
        role = SHOP_ROLE,
        customer = describe_customer(profile),
        query = query,
        passages = passages,
        history = or_none(history),
        purchases = format_purchases(purchases),
        insufficient = INSUFFICIENT_INFO,
    )
}

pub(crate) fn build_image_answer_prompt(
    description: &str,
    matches: &str,
    history: &str,
    profile: Option<&CallerProfile>,
) -> String {
    format!(
        r#"You help customers of a drinks shop find drinks from a photo. Reply in Vietnamese, in a warm and simple tone.

Customer: {customer}
Description of the customer's photo:
{description}

Matching products from the menu:
{matches}

Recent conversation:
{history}

Instructions:
1. Suggest concrete products from the matching products above.
2. Only suggest products. Do not describe or comment on the photo description itself.
3. For each product give its name, price and options when known.
4. If nothing matches well, invite the customer to explore popular drinks on the menu.
5. Prefer the matching products; use the conversation only when needed.
6. Keep it short and present several options as a clear list.
7. Never mention product or category ids."#,
        customer = describe_customer(profile),
        description = description,
        matches = matches,
        history = or_none(history),
    )
}

pub(crate) fn build_drink_traits_prompt(description: &str) -> String {
    format!(
        r#"Extract the traits of the drink described below.

Description:
{description}

Return a JSON object with exactly these string keys, written in Vietnamese, using null when a trait is not mentioned:
drink_type, drink_color, container_type, ingredients, topping, suitable_for

Return only the JSON object."#,
        description = description,
    )
}

fn describe_customer(profile: Option<&CallerProfile>) -> String {
    match profile {
        Some(profile) => match profile.attribute.as_deref() {
            Some(attribute) => format!("{} (giới tính: {})", profile.name, attribute),
            None => profile.name.clone(),
        },
        None => ANONYMOUS_CUSTOMER.to_string(),
    }
}

fn format_purchases(purchases: &[PurchaseRecord]) -> String {
    if purchases.is_empty() {
        return String::new();
    }

    let mut body = String::from("\nRecent purchases:\n");
    for purchase in purchases {
        let rating = purchase
            .rating
            .map(|r| format!("{}⭐", r))
            .unwrap_or_else(|| "n/a".to_string());
        body.push_str(&format!(
            "- {}: {} (quantity: {}, total: {}đ, rating: {})\n",
            purchase.date, purchase.product_name, purchase.quantity, purchase.price, rating
        ));
    }
    body
}

fn or_none(text: &str) -> &str {
    if text.trim().is_empty() {
        "(none)"
    } else {
        text
    }
}
