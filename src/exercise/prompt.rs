//! Prompt construction for exercise generation.
//!
//! A prompt is a list of literal instructions: a topic clause, the caller's
//! context, formatting constraints, and the response shape. Topic clauses are
//! looked up by exact label and may pick randomly among equivalent phrasings,
//! so two prompts for the same topic need not be identical.

use rand::seq::IndexedRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use super::types::{ChatHistory, Topic};

/// Opening line of every prompt.
pub const PROMPT_HEADER: &str = "Generate a piece of Python code with the following specifications:\n";

/// Prefix of the clause used for topics without a dedicated entry.
pub const GENERIC_CLAUSE_PREFIX: &str = "- The code must be about ";

/// Minimum number of non-blank code lines the prompt asks for.
pub const MIN_CODE_LINES: usize = 20;

const DATAFRAME_NONE_VALUES: &str = "The DataFrames in the code should contain some None values\n";

const DATAFRAME_TASKS: &[&str] = &[
    "- The code must create a pandas DataFrame and fill the missing values using fillna()\n",
    "- The code must create a pandas DataFrame and drop incomplete rows using dropna()\n",
    "- The code must create a pandas DataFrame, group it by a category column with groupby() and aggregate the results\n",
    "- The code must create two pandas DataFrames and combine them using merge()\n",
    "- The code must create a pandas DataFrame and reshape it using pivot_table()\n",
    "- The code must create a pandas DataFrame, filter rows with a boolean condition and sort the result with sort_values()\n",
];

const NMI_CLAUSES: &[&str] = &[
    "- The code must calculate the Normalised Mutual Information between two lists of cluster labels using sklearn.metrics.normalized_mutual_info_score\n",
    "- The code must compare two clusterings of the same data by computing their Normalised Mutual Information with sklearn.metrics.normalized_mutual_info_score\n",
    "- The code must compute the Normalised Mutual Information of two categorical columns of a pandas DataFrame using sklearn.metrics.normalized_mutual_info_score\n",
];

const CORRELATION_CLAUSES: &[&str] = &[
    "- The code must calculate the Pearson correlation between columns of a pandas DataFrame using DataFrame.corr()\n",
    "- The code must calculate the Spearman rank correlation between two columns of a pandas DataFrame using corr(method='spearman')\n",
    "- The code must calculate the correlation coefficient between two numeric lists using numpy.corrcoef()\n",
    "- The code must compute the correlation matrix of a pandas DataFrame and print the pair of columns with the strongest correlation\n",
];

const CSV_CLAUSES: &[&str] = &[
    "- The code must read a CSV file into a pandas DataFrame using pandas.read_csv(), transform it, and write the result to a new CSV file using to_csv()\n",
    "- The code must read a CSV file using Python's csv module, process its rows, and write a summary to a new CSV file\n",
    "- The code must open a CSV file with csv.DictReader, compute values from its columns, and write them out with csv.DictWriter\n",
];

const CSV_FILE_REQUIREMENT: &str =
    "- The CSV file read by the code must be the one described in CSVName and CSV\n";

/// Builds prompts for the exercise generator.
///
/// With a seed, phrasing choices are reproducible; without one they are drawn
/// from the thread RNG.
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    seed: Option<u64>,
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixes the RNG seed used for phrasing choices.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    fn create_rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }

    /// Builds the full prompt for `topic` narrowed by `context`.
    ///
    /// `history` only affects the prompt when non-empty: the model is then
    /// asked not to repeat an earlier exercise.
    pub fn build(&self, topic: &Topic, context: &str, history: &ChatHistory) -> String {
        let mut rng = self.create_rng();
        let mut prompt = String::from(PROMPT_HEADER);

        match topic_clause(topic, &mut rng) {
            Some(clause) => prompt.push_str(&clause),
            None => {
                prompt.push_str(GENERIC_CLAUSE_PREFIX);
                prompt.push_str(topic.label());
                prompt.push('\n');
            }
        }

        prompt.push_str(&format!(
            "- The code must also have the context of {}\n",
            context.trim()
        ));
        if !history.is_empty() {
            prompt.push_str("- The code must be different from any code you generated earlier in this conversation\n");
        }

        prompt.push_str(
            "- The code must not contain any lines of comments or explanations in the code\n",
        );
        prompt.push_str(&format!(
            "- The code must be at least {} lines long, excluding any empty lines\n",
            MIN_CODE_LINES
        ));

        prompt.push_str(RESPONSE_SHAPE);
        prompt
    }
}

/// Response-shape directive naming the five required fields.
pub const RESPONSE_SHAPE: &str = "Format the response in JSON format with exactly the following attributes:\n\
- Code: The generated piece of code, as a list of strings with one line of code per element\n\
- Description: a brief description on what the code does, if the code has multiple print statements, the description should specify the order in which they are printed\n\
- ExpectedOutput: a brief description on what the code should output\n\
- CSVName: If the code involves opening and reading a file, generate the name of the file, otherwise an empty string\n\
- CSV: If the code involves opening and reading a file, generate an example of the file content, otherwise an empty string\n";

/// Topic-specific clause, or `None` when the topic has no table entry.
fn topic_clause(topic: &Topic, rng: &mut ChaCha8Rng) -> Option<String> {
    let pick = |options: &[&str], rng: &mut ChaCha8Rng| -> String {
        options.choose(rng).copied().unwrap_or_default().to_string()
    };

    // Exact match on the label: custom topics that spell a known label share
    // its clause.
    match topic.label() {
        "DataFrame" => Some(format!(
            "{}{}",
            DATAFRAME_NONE_VALUES,
            pick(DATAFRAME_TASKS, rng)
        )),
        "NMI (Normalised Mutual Information)" => Some(pick(NMI_CLAUSES, rng)),
        "Correlation" => Some(pick(CORRELATION_CLAUSES, rng)),
        "Reading/Writing CSV files" => Some(format!(
            "{}{}",
            pick(CSV_CLAUSES, rng),
            CSV_FILE_REQUIREMENT
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_generic_clause(prompt: &str) -> bool {
        prompt.contains(GENERIC_CLAUSE_PREFIX)
    }

    fn has_specific_clause(prompt: &str) -> bool {
        [DATAFRAME_TASKS, NMI_CLAUSES, CORRELATION_CLAUSES, CSV_CLAUSES]
            .iter()
            .flat_map(|options| options.iter())
            .any(|clause| prompt.contains(clause))
    }

    fn build(topic: Topic, context: &str) -> String {
        PromptBuilder::new().build(&topic, context, &ChatHistory::new())
    }

    #[test]
    fn test_specific_or_generic_clause_never_both() {
        let mut topics = Topic::all();
        topics.push(Topic::Custom("Recursion".to_string()));

        for topic in topics {
            for _ in 0..10 {
                let prompt = build(topic.clone(), "a library");
                assert!(
                    has_specific_clause(&prompt) ^ has_generic_clause(&prompt),
                    "topic {:?} produced:\n{}",
                    topic,
                    prompt
                );
            }
        }
    }

    #[test]
    fn test_table_topics_use_specific_clause() {
        for topic in [Topic::DataFrame, Topic::Nmi, Topic::Correlation, Topic::Csv] {
            let prompt = build(topic, "sales");
            assert!(has_specific_clause(&prompt));
            assert!(!has_generic_clause(&prompt));
        }
    }

    #[test]
    fn test_unmatched_topics_fall_back_to_generic() {
        let prompt = build(Topic::LinearRegression, "house prices");
        assert!(prompt.contains("- The code must be about Linear Regression\n"));

        let prompt = build(Topic::Custom("Binary Search".to_string()), "phone book");
        assert!(prompt.contains("- The code must be about Binary Search\n"));
    }

    #[test]
    fn test_custom_topic_spelling_a_label_matches_table() {
        let prompt = build(Topic::Custom("Correlation".to_string()), "weather");
        assert!(has_specific_clause(&prompt));
    }

    #[test]
    fn test_required_instructions_present() {
        let prompt = build(Topic::Correlation, "exam scores");

        assert!(prompt.starts_with(PROMPT_HEADER));
        assert!(prompt.contains("- The code must also have the context of exam scores\n"));
        assert!(prompt.contains("must not contain any lines of comments"));
        assert!(prompt.contains("at least 20 lines long, excluding any empty lines"));
        for field in ["- Code:", "- Description:", "- ExpectedOutput:", "- CSVName:", "- CSV:"] {
            assert!(prompt.contains(field), "missing field {}", field);
        }
    }

    #[test]
    fn test_dataframe_requires_none_values() {
        let prompt = build(Topic::DataFrame, "zoo");
        assert!(prompt.contains(DATAFRAME_NONE_VALUES));
    }

    #[test]
    fn test_csv_topic_requires_artifact() {
        let prompt = build(Topic::Csv, "inventory");
        assert!(prompt.contains(CSV_FILE_REQUIREMENT));
    }

    #[test]
    fn test_seeded_builder_is_reproducible() {
        let builder = PromptBuilder::new().with_seed(7);
        let history = ChatHistory::new();
        let a = builder.build(&Topic::Correlation, "exam scores", &history);
        let b = builder.build(&Topic::Correlation, "exam scores", &history);
        assert_eq!(a, b);
    }

    #[test]
    fn test_history_adds_novelty_clause() {
        let mut history = ChatHistory::new();
        let builder = PromptBuilder::new().with_seed(1);
        let fresh = builder.build(&Topic::Nmi, "genes", &history);
        assert!(!fresh.contains("different from any code"));

        history.push_exchange("old prompt", "old reply");
        let continued = builder.build(&Topic::Nmi, "genes", &history);
        assert!(continued.contains("different from any code"));
    }
}
