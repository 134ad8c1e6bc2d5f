use clap::{Parser, Subcommand};

/// Runs a brand-name preference survey: hands out forms, records the answers and
/// reports the most and least appealing names.
///
/// The storage is configured with the DATABASE_URL environment variable
/// (for example sqlite://survey.db), and optionally DATABASE_POOL_SIZE.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, optional) A JSON file describing the forms, the questions and the ranking rules.
    /// If not provided, the built-in catalog of six forms is used.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Creates the tables if needed and registers the configured forms.
    Init,
    /// Hands out a form to a respondent and prints it in JSON format.
    Assign {
        /// (optional) The session identifier. A new one is generated if not provided.
        #[clap(long, value_parser)]
        session: Option<String>,
    },
    /// Records a completed survey.
    Submit {
        /// The form that was handed out to the respondent.
        #[clap(long, value_parser)]
        form: u32,
        /// The session identifier printed by the assign command.
        #[clap(long, value_parser)]
        session: String,
        /// (repeated) One answer, written as <question id>=<name>, for example q1=Give-io
        #[clap(short = 'a', long = "answer", value_parser)]
        answers: Vec<String>,
        /// (optional, free text) What the respondent liked in their favorite name.
        #[clap(long, value_parser)]
        top_choice: Option<String>,
        /// (optional, free text) What the respondent disliked in their least favorite name.
        #[clap(long, value_parser)]
        bottom_choice: Option<String>,
    },
    /// Prints the submission counts and the rankings of every question.
    Results {
        /// Prints the results in JSON format instead of text.
        #[clap(long, takes_value = false)]
        json: bool,
    },
    /// Prints the submission count of every form in JSON format.
    Stats,
    /// Recomputes the submission counts from the stored submissions.
    Reconcile,
    /// Prints the stored submissions in JSON format.
    Export {
        /// (optional) Only exports the submissions of this form.
        #[clap(long, value_parser)]
        form: Option<u32>,
    },
}
