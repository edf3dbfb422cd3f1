//! Parquet encoding of [`StoredRecord`]s, one single-row file per post.

use analyzer_core::{
    Concept, CoreError, ProblemExplanation, StorageError, StoredRecord, StructuredExplanation,
};
use arrow_array::builder::{ListBuilder, StringBuilder};
use arrow_array::{ArrayRef, Int64Array, ListArray, RecordBatch, StringArray, StructArray, UInt32Array};
use arrow_buffer::OffsetBuffer;
use arrow_schema::{DataType, Field, Fields, Schema};
use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::sync::Arc;

pub const RECORD_EXTENSION: &str = "parquet";

/// Date-partitioned object key: `prefix/year=YYYY/month=MM/day=DD/<post-id>.parquet`.
pub fn record_key(prefix: &str, analysis_time: DateTime<Utc>, post_id: &str) -> String {
    let partition = format!(
        "year={:04}/month={:02}/day={:02}/{}.{}",
        analysis_time.year(),
        analysis_time.month(),
        analysis_time.day(),
        post_id,
        RECORD_EXTENSION
    );
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        partition
    } else {
        format!("{prefix}/{partition}")
    }
}

fn iso(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn encoding_error(reason: impl ToString) -> CoreError {
    CoreError::Storage(StorageError::EncodingFailed {
        reason: reason.to_string(),
    })
}

fn concept_fields() -> Fields {
    Fields::from(vec![
        Field::new("name", DataType::Utf8, false),
        Field::new("definition", DataType::Utf8, false),
        Field::new("use_case", DataType::Utf8, false),
        Field::new("how_it_functions", DataType::Utf8, false),
    ])
}

fn concept_list_field() -> Arc<Field> {
    Arc::new(Field::new(
        "item",
        DataType::Struct(concept_fields()),
        true,
    ))
}

fn structured_explanation_fields() -> Fields {
    Fields::from(vec![
        Field::new(
            "primary_concepts",
            DataType::List(concept_list_field()),
            false,
        ),
        Field::new("explanation", DataType::Utf8, false),
    ])
}

fn problem_explanation_type(explanation: &ProblemExplanation) -> DataType {
    match explanation {
        ProblemExplanation::Text(_) => DataType::Utf8,
        ProblemExplanation::Structured(_) => DataType::Struct(structured_explanation_fields()),
    }
}

/// Arrow schema of a record. `ProblemExplanation` is a string or a struct
/// depending on the run's explanation shape.
pub fn record_schema(explanation: &ProblemExplanation) -> Schema {
    Schema::new(vec![
        Field::new("PostID", DataType::Utf8, false),
        Field::new("Subreddit", DataType::Utf8, false),
        Field::new("Title", DataType::Utf8, false),
        Field::new("Selftext", DataType::Utf8, false),
        Field::new("URL", DataType::Utf8, false),
        Field::new("Author", DataType::Utf8, false),
        Field::new("Score", DataType::Int64, false),
        Field::new("OriginalCommentCount", DataType::UInt32, false),
        Field::new("FetchedCommentCountForAnalysis", DataType::UInt32, false),
        Field::new("PostTimestampUTC", DataType::Utf8, false),
        Field::new("FetchedCommentsText", DataType::Utf8, false),
        Field::new("ProblemSummary", DataType::Utf8, false),
        Field::new("SolutionSummary", DataType::Utf8, false),
        Field::new(
            "ProblemExplanation",
            problem_explanation_type(explanation),
            false,
        ),
        Field::new("SolutionExplanation", DataType::Utf8, false),
        Field::new(
            "SuggestedCategories",
            DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
            false,
        ),
        Field::new("AnalysisTimestampUTC", DataType::Utf8, false),
        Field::new("BedrockModelID", DataType::Utf8, false),
    ])
}

fn string_column(value: &str) -> ArrayRef {
    Arc::new(StringArray::from(vec![value]))
}

fn concept_column(concepts: &[Concept], project: fn(&Concept) -> &str) -> ArrayRef {
    Arc::new(StringArray::from(
        concepts.iter().map(project).collect::<Vec<_>>(),
    ))
}

fn structured_explanation_column(structured: &StructuredExplanation) -> Result<ArrayRef, CoreError> {
    let concepts = &structured.primary_concepts;
    let column = |project: fn(&Concept) -> &str| concept_column(concepts, project);

    let concept_values = StructArray::try_new(
        concept_fields(),
        vec![
            column(|c| c.name.as_str()),
            column(|c| c.definition.as_str()),
            column(|c| c.use_case.as_str()),
            column(|c| c.how_it_functions.as_str()),
        ],
        None,
    )
    .map_err(encoding_error)?;

    let concept_list = ListArray::try_new(
        concept_list_field(),
        OffsetBuffer::from_lengths([concepts.len()]),
        Arc::new(concept_values),
        None,
    )
    .map_err(encoding_error)?;

    let explanation = StructArray::try_new(
        structured_explanation_fields(),
        vec![Arc::new(concept_list), string_column(&structured.explanation)],
        None,
    )
    .map_err(encoding_error)?;

    Ok(Arc::new(explanation))
}

fn problem_explanation_column(explanation: &ProblemExplanation) -> Result<ArrayRef, CoreError> {
    match explanation {
        ProblemExplanation::Text(text) => Ok(string_column(text)),
        ProblemExplanation::Structured(structured) => structured_explanation_column(structured),
    }
}

fn categories_column(categories: &[String]) -> ArrayRef {
    let mut builder = ListBuilder::new(StringBuilder::new());
    for category in categories {
        builder.values().append_value(category);
    }
    builder.append(true);
    Arc::new(builder.finish())
}

/// Builds the single-row batch for `record`.
pub fn record_batch(record: &StoredRecord) -> Result<RecordBatch, CoreError> {
    let analysis = &record.analysis;
    let schema = Arc::new(record_schema(&analysis.problem_explanation));

    let columns: Vec<ArrayRef> = vec![
        string_column(&record.post_id),
        string_column(&record.subreddit),
        string_column(&record.title),
        string_column(&record.selftext),
        string_column(&record.url),
        string_column(&record.author),
        Arc::new(Int64Array::from(vec![record.score])),
        Arc::new(UInt32Array::from(vec![record.original_comment_count])),
        Arc::new(UInt32Array::from(vec![record.fetched_comment_count])),
        string_column(&iso(record.post_timestamp_utc)),
        string_column(&record.fetched_comments_text),
        string_column(&analysis.problem_summary),
        string_column(&analysis.solution_summary),
        problem_explanation_column(&analysis.problem_explanation)?,
        string_column(&analysis.solution_explanation),
        categories_column(&analysis.suggested_categories),
        string_column(&iso(record.analysis_timestamp_utc)),
        string_column(&record.model_id),
    ];

    RecordBatch::try_new(schema, columns).map_err(encoding_error)
}

/// Encodes `record` as a snappy-compressed Parquet file.
pub fn encode_record(record: &StoredRecord) -> Result<Vec<u8>, CoreError> {
    let batch = record_batch(record)?;
    let properties = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();

    let mut buffer = Vec::new();
    let mut writer =
        ArrowWriter::try_new(&mut buffer, batch.schema(), Some(properties)).map_err(encoding_error)?;
    writer.write(&batch).map_err(encoding_error)?;
    writer.close().map_err(encoding_error)?;
    Ok(buffer)
}
