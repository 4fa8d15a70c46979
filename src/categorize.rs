use crate::marketplace::types::Job;

/// Category assigned to a discovered job by weighted keyword scoring.
///
/// Each category carries a bid multiplier reflecting how competitively this
/// agent prices that kind of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobCategory {
    WebScraping,
    Automation,
    DataProcessing,
    ApiIntegration,
    WebDevelopment,
    General,
}

impl JobCategory {
    pub fn label(&self) -> &'static str {
        match self {
            JobCategory::WebScraping => "web_scraping",
            JobCategory::Automation => "automation",
            JobCategory::DataProcessing => "data_processing",
            JobCategory::ApiIntegration => "api_integration",
            JobCategory::WebDevelopment => "web_development",
            JobCategory::General => "general",
        }
    }

    /// Multiplier applied to the job budget when pricing a bid.
    pub fn multiplier(&self) -> f64 {
        match self {
            JobCategory::WebScraping => 0.85,
            JobCategory::Automation => 0.8,
            JobCategory::DataProcessing => 0.8,
            JobCategory::ApiIntegration => 0.9,
            JobCategory::WebDevelopment => 1.0,
            JobCategory::General => 0.75,
        }
    }
}

impl std::fmt::Display for JobCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Weighted keyword-based categorization over title + description.
pub fn categorize(job: &Job) -> JobCategory {
    let lower = format!("{} {}", job.title, job.description).to_lowercase();

    let keyword_categories: &[(&str, JobCategory, u32)] = &[
        ("scrape", JobCategory::WebScraping, 10),
        ("scraping", JobCategory::WebScraping, 10),
        ("crawl", JobCategory::WebScraping, 8),
        ("extract data", JobCategory::WebScraping, 5),
        ("automate", JobCategory::Automation, 10),
        ("automation", JobCategory::Automation, 10),
        ("bot", JobCategory::Automation, 5),
        ("schedule", JobCategory::Automation, 3),
        ("csv", JobCategory::DataProcessing, 7),
        ("excel", JobCategory::DataProcessing, 7),
        ("parse", JobCategory::DataProcessing, 5),
        ("convert", JobCategory::DataProcessing, 5),
        ("clean data", JobCategory::DataProcessing, 8),
        ("api", JobCategory::ApiIntegration, 8),
        ("integrate", JobCategory::ApiIntegration, 8),
        ("webhook", JobCategory::ApiIntegration, 10),
        ("website", JobCategory::WebDevelopment, 8),
        ("landing page", JobCategory::WebDevelopment, 10),
        ("frontend", JobCategory::WebDevelopment, 8),
        ("html", JobCategory::WebDevelopment, 5),
    ];

    let mut scores: std::collections::HashMap<&'static str, (JobCategory, u32)> =
        std::collections::HashMap::new();

    for &(keyword, category, weight) in keyword_categories {
        if lower.contains(keyword) {
            let entry = scores.entry(category.label()).or_insert((category, 0));
            entry.1 += weight;
        }
    }

    scores
        .into_values()
        .max_by_key(|&(_, score)| score)
        .map(|(category, _)| category)
        .unwrap_or(JobCategory::General)
}

/// Draft the proposal text sent with a bid. Templated per category; the
/// marketplace renders this to the requester verbatim.
pub fn draft_proposal(job: &Job, category: JobCategory) -> String {
    let opener = match category {
        JobCategory::WebScraping => {
            "I build resilient scrapers with polite rate limiting and clean structured output."
        }
        JobCategory::Automation => {
            "I specialize in hands-off automation scripts that run reliably on a schedule."
        }
        JobCategory::DataProcessing => {
            "I work with messy data daily and deliver clean, validated output in the format you need."
        }
        JobCategory::ApiIntegration => {
            "I have deep experience wiring third-party APIs together with solid error handling."
        }
        JobCategory::WebDevelopment => {
            "I deliver fast, responsive pages with clean markup and no framework bloat."
        }
        JobCategory::General => "I deliver small, well-tested tools quickly.",
    };
    format!(
        "{opener}\n\nFor \"{}\" I will deliver working, documented code with a public link you can \
         review before accepting. Happy to iterate on feedback until it does exactly what you need.",
        job.title
    )
}
