//! Prompt construction for thread analysis.
//!
//! The prompt asks for a single JSON object with exactly five keys. Free
//! text from the thread has its braces replaced so that it cannot be read
//! as part of that object; the extractor still assumes the model may
//! ignore the contract.

use analyzer_core::{ExplanationSchema, MAX_COMMENTS_FOR_PROMPT};

/// Characters of a single comment kept in the prompt.
pub const COMMENT_CHAR_BUDGET: usize = 1500;
pub const TRUNCATION_MARKER: &str = "...";

const CATEGORY_EXAMPLES: &str = "EC2, S3, Lambda, Networking, Security, Cost Optimization, Migration, Serverless, Databases, IAM, Containers, CI/CD, IaC, Monitoring, API Gateway, Route 53, CloudFront, Other";

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    schema: ExplanationSchema,
    max_comments: usize,
}

impl PromptBuilder {
    pub fn new(schema: ExplanationSchema) -> Self {
        Self {
            schema,
            max_comments: MAX_COMMENTS_FOR_PROMPT,
        }
    }

    pub fn with_max_comments(mut self, max_comments: usize) -> Self {
        self.max_comments = max_comments;
        self
    }

    pub fn schema(&self) -> ExplanationSchema {
        self.schema
    }

    /// Builds the user message for one thread. Only the first
    /// `max_comments` comments are used.
    pub fn build(&self, title: &str, body: &str, comments: &[&str]) -> String {
        let mut prompt = String::with_capacity(4096);
        prompt.push_str(
            "Analyze the following Reddit thread (original post and top comments) about AWS, \
             focusing on explaining the concepts for learning purposes.\n\n",
        );
        prompt.push_str(&self.instructions());
        prompt.push_str("\n\n");
        prompt.push_str(&output_contract(self.schema));
        prompt.push_str(&format!("\n\nExample Categories: {CATEGORY_EXAMPLES}.\n\n"));
        prompt.push_str("Reddit Thread Text:\n<thread>\n");
        prompt.push_str(&self.thread_text(title, body, comments));
        prompt.push_str("</thread>\n");
        prompt
    }

    fn thread_text(&self, title: &str, body: &str, comments: &[&str]) -> String {
        let mut text = format!(
            "Original Post Title: {}\n\nOriginal Post Body:\n{}\n\n",
            replace_braces(title),
            replace_braces(body)
        );

        text.push_str(&format!(
            "Top Comments Provided (up to {}):\n",
            self.max_comments
        ));
        let selected: Vec<&str> = comments.iter().take(self.max_comments).copied().collect();
        if selected.is_empty() {
            text.push_str("No relevant comments provided or fetched.\n");
        } else {
            for (i, comment) in selected.iter().enumerate() {
                text.push_str(&format!("Comment {}:\n{}\n---\n", i + 1, escape_comment(comment)));
            }
        }
        text
    }

    fn instructions(&self) -> String {
        let explanation_step = match self.schema {
            ExplanationSchema::Structured => {
                "2.  **Problem Explanation (Learning Focus):** Provide educational context about the technologies involved. \
                 Identify the 1-2 primary AWS services or key technical concepts central to the problem and, for each one, \
                 explain what it is, its primary use case and how it functions. Briefly connect them back to the 'problem_summary'. \
                 The value for 'problem_explanation' MUST be a JSON object with a list of objects under the key 'primary_concepts' \
                 and a string under the key 'explanation'. Each object in 'primary_concepts' must have string values for \
                 'name', 'definition', 'use_case' and 'how_it_functions'."
            }
            ExplanationSchema::Text => {
                "2.  **Problem Explanation (Learning Focus):** Explain, for a learner, the 1-2 primary AWS services or key \
                 technical concepts central to the problem (what they are, their use case, how they function) and connect \
                 them back to the 'problem_summary'. The value for 'problem_explanation' MUST be a single JSON string."
            }
        };

        [
            "1.  **Problem Identification & Summary:** Identify the core technical problem or question from the original post. \
             Provide a concise summary (1-2 sentences) as 'problem_summary'. This MUST be a JSON string value.",
            explanation_step,
            "3.  **Solution Identification & Summary:** Analyze the provided top comments. Concisely summarize the main potential \
             solutions, suggestions or key advice as 'solution_summary'. This MUST be a JSON string value. If no relevant \
             solutions are found, state \"No specific solutions offered in provided comments.\"",
            "4.  **Solution Explanation:** Explain the summarized solutions in simple terms, defining any key technical terms \
             from the comments, in a few sentences. The value for 'solution_explanation' MUST be a single JSON string value. \
             Do NOT create a nested JSON object for this field.",
            "5.  **Categorization:** Identify the top 3 most relevant AWS service categories or technical concepts. \
             The value for 'suggested_categories' MUST be a JSON list of strings (maximum 3 strings).",
        ]
        .join("\n")
    }
}

fn output_contract(schema: ExplanationSchema) -> String {
    let explanation_type = match schema {
        ExplanationSchema::Structured => {
            "*   The value for \"problem_explanation\" MUST be a JSON object: \
             {\"primary_concepts\": [{\"name\": string, \"definition\": string, \"use_case\": string, \
             \"how_it_functions\": string}], \"explanation\": string}."
        }
        ExplanationSchema::Text => "*   The value for \"problem_explanation\" MUST be a JSON string.",
    };

    [
        "**Output Format:** Format the output strictly as a single, valid JSON object starting with `{` and ending with `}`.",
        "*   Use only the keys \"problem_summary\", \"problem_explanation\", \"solution_summary\", \"solution_explanation\" and \"suggested_categories\".",
        "*   \"problem_summary\", \"solution_summary\" and \"solution_explanation\" MUST be JSON strings enclosed in double quotes.",
        explanation_type,
        "*   The value for \"suggested_categories\" MUST be a JSON list of at most 3 strings.",
        "*   Ensure proper JSON syntax. Do not include any text before `{` or after `}`.",
    ]
    .join("\n")
}

/// Replaces `{` and `}` with parentheses.
pub fn replace_braces(text: &str) -> String {
    text.replace('{', "(").replace('}', ")")
}

/// Cuts `text` to `budget` characters, appending [`TRUNCATION_MARKER`] when
/// anything was dropped.
pub fn truncate_chars(text: &str, budget: usize) -> String {
    match text.char_indices().nth(budget) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Truncates a comment and escapes it as the inside of a JSON string, so
/// quotes, backslashes and newlines cannot break the surrounding prompt.
pub fn escape_comment(comment: &str) -> String {
    let truncated = replace_braces(&truncate_chars(comment, COMMENT_CHAR_BUDGET));
    match serde_json::to_string(&truncated) {
        Ok(quoted) => quoted[1..quoted.len() - 1].to_string(),
        Err(_) => truncated,
    }
}
