use crate::dialogue::OpenAiDialogueClient;
use crate::infra::{parse_symptom, InMemoryTriageRepository, JsonFileRepository};
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use triage_engine::config::DialogueConfig;
use triage_engine::error::AppError;
use triage_engine::workflows::triage::scoring::{breakdown, score};
use triage_engine::workflows::triage::{
    CaseDetail, PatientId, PatientProfile, SymptomRecord, TriageRepository, TriageService,
    TriageStore,
};

const DEMO_CONVERSATION: &[&str] = &[
    "Hello, I need medical advice",
    "I have a severe headache and some dizziness",
    "It's about an 8 out of 10 and it started 3 days ago",
    "I have high blood pressure and diabetes",
    "I don't smoke or drink. I try to walk daily but haven't due to the headache. \
     My stress is high.",
    "Yes, please schedule a follow-up",
];

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Persist the demo patient and case to this JSON file instead of memory.
    #[arg(long)]
    pub(crate) data_file: Option<PathBuf>,
    /// Print the full case detail as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ScoreArgs {
    /// Symptom as name:severity:days (repeatable)
    #[arg(long = "symptom", value_parser = parse_symptom, required = true)]
    pub(crate) symptoms: Vec<SymptomRecord>,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    match args.data_file.clone() {
        Some(path) => run_intake_demo(Arc::new(JsonFileRepository::new(path)), args.json).await,
        None => run_intake_demo(Arc::new(InMemoryTriageRepository::default()), args.json).await,
    }
}

async fn run_intake_demo<R>(repository: Arc<R>, print_json: bool) -> Result<(), AppError>
where
    R: TriageRepository + 'static,
{
    let store = Arc::new(TriageStore::open(repository));
    let dialogue = Arc::new(OpenAiDialogueClient::new(DialogueConfig::default()));
    let service = TriageService::new(store.clone(), dialogue);

    let patient_id = PatientId::generate();
    let mut profile = PatientProfile::new(patient_id.clone(), "John Doe", 45, "male");
    profile.medical_history = vec!["Hypertension".to_string(), "Type 2 Diabetes".to_string()];
    profile.allergies = vec!["Penicillin".to_string()];
    profile.current_medications = vec!["Lisinopril".to_string(), "Metformin".to_string()];
    store.register_patient(profile)?;

    println!("Patient intake demo");
    for message in DEMO_CONVERSATION {
        println!("Patient: {message}\n");
        let reply = service.handle_message(&patient_id, message).await;
        println!("Assistant [{}]: {}\n", reply.stage.label(), reply.reply);
    }

    println!("Clinician queue:");
    let dashboard = service.dashboard();
    for (position, entry) in dashboard.iter().enumerate() {
        println!(
            "{}. {} | Priority: {} ({}/100)",
            position + 1,
            entry.patient_name,
            entry.summary.priority_level.title(),
            entry.summary.priority_score
        );
    }

    for followup in service.followups() {
        println!(
            "Follow-up with {} due {}",
            followup.patient_id,
            followup.due_at.format("%Y-%m-%d")
        );
    }

    let Some(entry) = dashboard.first() else {
        println!("  No cases queued");
        return Ok(());
    };
    match service.case_detail(&entry.summary.case_id) {
        Ok(detail) => render_case_detail(&detail, print_json),
        Err(err) => println!("  Case detail unavailable: {err}"),
    }

    Ok(())
}

fn render_case_detail(detail: &CaseDetail, print_json: bool) {
    println!("\nCase details:");
    println!(
        "Priority: {} ({}/100)",
        detail.case.priority_level().title(),
        detail.case.priority_score()
    );
    println!("Recommendation: {}", detail.case.recommendation());
    println!("Symptoms:");
    for symptom in detail.case.symptoms() {
        println!(
            "- {}: Severity {}/10, Duration: {} days",
            symptom.name(),
            symptom.severity(),
            symptom.duration_days()
        );
    }
    if let Some(patient) = &detail.patient {
        println!("Medical history: {}", patient.medical_history.join("; "));
        if !patient.lifestyle_factors.notes.is_empty() {
            println!("Lifestyle notes: {}", patient.lifestyle_factors.notes.join("; "));
        }
    }

    if print_json {
        match serde_json::to_string_pretty(detail) {
            Ok(json) => println!("\n{json}"),
            Err(err) => println!("Case payload unavailable: {err}"),
        }
    }
}

pub(crate) fn run_score(args: ScoreArgs) -> Result<(), AppError> {
    let assessment = score(&args.symptoms);

    println!("Score components:");
    for component in breakdown(&args.symptoms) {
        println!(
            "- {}: severity {} x 2 x {:.1} (duration {} days) = {:.1}",
            component.symptom,
            component.severity,
            component.duration_factor,
            component.duration_days,
            component.contribution
        );
    }
    println!(
        "Priority: {} ({}/100)",
        assessment.level.title(),
        assessment.score
    );
    println!("Recommendation: {}", assessment.recommendation);
    Ok(())
}
