//! Prompt Assembly
//!
//! The fixed instructions sent to the model and the rendering of the system
//! prompt template from the database schema context.

use askdb_core::PromptTemplate;

use crate::storage::schema::SchemaContext;
use crate::utils::error::{AppError, AppResult};

const TEMPLATE_SLOTS: [&str; 3] = ["db_schema", "table_examples", "table_name"];

/// System prompt template. Slots: `db_schema`, `table_name`, `table_examples`.
pub const BASE_SYSTEM_PROMPT: &str = r#"
You are an expert assistant for database analysis and SQL generation.
Your job is to read the user's question and decide whether it needs an SQL
query or a direct answer.

- If the question needs data, generate valid SQL for the connected database.
- If the question does not need SQL (for example a general question), answer
  in natural language and do not return any JSON.
- Return JSON only when the question needs SQL or calculations over the data.

Available database:
{db_schema}

Example rows (so you understand the values and types):
{table_examples}

IMPORTANT rules:
1. Safety:
   - Only generate SELECT or WITH queries.
   - Never use DELETE, DROP, UPDATE, ALTER, INSERT or any other modifying command.

2. Output format (exact, valid JSON):
{{
  "needs_sql": true/false,
  "sql": ["SELECT ...;", "..."],
  "notes": "Explanation of the reasoning"
}}

3. SQL practice:
   - Use only tables and columns that exist in the schema.
   - End every query with a semicolon (;).
   - Convert text columns holding numbers safely, e.g. REPLACE(col, ',', '.')::numeric.
   - Guard against NULLs and malformed values with suitable filters.
   - Quote column names exactly as they appear in the table.
   - Every WITH must end in a final SELECT that returns rows.
   - No trailing commas and no empty CTEs.
   - When the user asks about the table (rows, columns, averages, ranges,
     trends, outliers, correlations), always generate SQL that returns the
     real value from the database.
   - Never answer with estimates or from the example rows in this prompt.

4. Analyses you can perform:
   - Averages, sums, counts, minimums, maximums.
   - Grouping (GROUP BY / HAVING).
   - Trends over time (ROW_NUMBER(), LAG, LEAD).
   - Percentiles and standard deviation.
   - Comparisons between periods or categories.
   - Anomalies (values outside mean +/- k * stddev).
   - Correlations and relations between columns (CORR, ratios, differences).

5. Examples:

User: "How did the average of reading evolve over time?"
You:
{{
  "needs_sql": true,
  "sql": [
    "WITH ordered AS (SELECT ROW_NUMBER() OVER (ORDER BY id) AS idx, reading AS value FROM {table_name} WHERE reading IS NOT NULL) SELECT idx, value, value - LAG(value) OVER (ORDER BY idx) AS diff FROM ordered;"
  ],
  "notes": "Trend of reading using the LAG window function."
}}

User: "Is there a correlation between temperature and speed?"
You:
{{
  "needs_sql": true,
  "sql": [
    "SELECT CORR(temperature, speed) AS correlation FROM {table_name} WHERE temperature IS NOT NULL AND speed IS NOT NULL;"
  ],
  "notes": "Pearson correlation between temperature and speed."
}}

6. When the question needs no SQL, answer with:
{{
  "needs_sql": false,
  "sql": [],
  "notes": "The answer can be given directly in natural language."
}}

7. Relations between columns:
   - Use CORR(col1, col2) for numeric correlation.
   - Use ratios or differences for proportional relations: col1 / col2, col1 - col2.
   - Use NULLIF(col2, 0) to avoid division by zero.
   - Several correlations may be returned by a single query.

Your goal: generate correct, safe SQL, run it, interpret the results and
answer the user in natural language.
"#;

/// Appended as the last system message of the decision request.
pub const DECIDE_INSTRUCTION: &str = r#"
Reply ONLY with an EXACT JSON OBJECT:
{
  "needs_sql": true/false,
  "sql": ["SELECT ...;", "..."],
  "notes": ""
}
Rules:
- Generate valid SQL, using CAST and REPLACE for text columns holding numbers.
- Use CORR, differences and ratios when the user compares columns.
- For trends, time series and outliers, follow the CTE examples above.
- Every query must be SELECT or WITH and end with ;.
- If no safe SQL can be generated, set needs_sql=false and explain in notes.
- Think step by step before producing the JSON.
- If the user asks about the table or correlations between columns, always
  generate valid SQL that fetches the real value.
"#;

/// System instruction for turning executed results into an answer.
pub const FINAL_ANSWER_INSTRUCTION: &str = "Give ONE clear, concise answer based on the SQL results.
Summarize only what the user asked for.
Do not repeat information from earlier answers.
Do not show SQL or raw tables.";

/// System instruction for questions answered without SQL.
pub const GENERAL_ANSWER_INSTRUCTION: &str = "
Answer in natural language only, no SQL is needed.
";

/// Renders the prompts that depend on the database and reference text.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    base: PromptTemplate,
}

impl PromptBuilder {
    pub fn new() -> AppResult<Self> {
        Self::with_template(BASE_SYSTEM_PROMPT)
    }

    /// Use a custom system prompt template. It must use exactly the
    /// `db_schema`, `table_name` and `table_examples` slots.
    pub fn with_template(source: &str) -> AppResult<Self> {
        let base = PromptTemplate::parse(source)?;
        let mut slots = base.slots();
        slots.sort_unstable();
        if slots != TEMPLATE_SLOTS {
            return Err(AppError::validation(format!(
                "system prompt template must use the slots {:?}, found {:?}",
                TEMPLATE_SLOTS, slots
            )));
        }
        Ok(Self { base })
    }

    /// The session's system prompt: the template filled from the schema
    /// context, followed by the reference text when there is any.
    pub fn system_prompt(&self, schema: &SchemaContext, reference_text: &str) -> AppResult<String> {
        let mut prompt = self.base.render(&[
            ("db_schema", schema.schema_text.as_str()),
            ("table_name", schema.table_name.as_str()),
            ("table_examples", schema.sample_rows.as_str()),
        ])?;
        if !reference_text.is_empty() {
            prompt.push_str("\n\nAdditional context from the reference file:\n");
            prompt.push_str(reference_text);
        }
        Ok(prompt)
    }

    /// The per-turn decision context: the template with only the table name
    /// filled, followed by reference chunks relevant to the question.
    pub fn decision_context(&self, table_name: &str, relevant: &str) -> AppResult<String> {
        let mut context = self.base.render(&[
            ("db_schema", ""),
            ("table_name", table_name),
            ("table_examples", ""),
        ])?;
        if !relevant.is_empty() {
            context.push_str("\n\nRelevant information from the reference file:\n");
            context.push_str(relevant);
        }
        Ok(context)
    }
}

/// System message for the no-SQL path.
pub fn general_system_message(relevant: &str) -> String {
    if relevant.is_empty() {
        GENERAL_ANSWER_INSTRUCTION.to_string()
    } else {
        format!(
            "{}\nContextual information about the database:\n{}",
            GENERAL_ANSWER_INSTRUCTION, relevant
        )
    }
}

/// User message carrying the question and the executed results.
pub fn synthesis_user_message(question: &str, results_json: &str) -> String {
    format!(
        "Original question: {}\nExecuted results: {}",
        question, results_json
    )
}
