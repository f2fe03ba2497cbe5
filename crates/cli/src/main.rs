use clap::{Parser, Subcommand};
use medilink_core::{
    config::DEFAULT_MESSAGE_KEY, AuthService, Db, DurationType, MessageCipher, MessageVault,
    NewPrescription, PrescriptionLedger, Registration, Role,
};
use medilink_types::{EmailAddress, NonEmptyText};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "medilink")]
#[command(about = "MediLink clinical records system CLI")]
struct Cli {
    /// SQLite database file
    #[arg(long, default_value = "medilink.db")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    InitDb,
    /// Insert demonstration users, enrollments, and prescriptions
    Seed,
    /// List registered users for a role
    ListUsers {
        /// patient, doctor, or pharmacist
        role: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let db = Arc::new(Db::open(&cli.db_path)?);

    match cli.command {
        Some(Commands::InitDb) => {
            db.init_schema()?;
            println!("Initialised schema in {}", cli.db_path.display());
        }
        Some(Commands::Seed) => {
            db.init_schema()?;
            match seed(db) {
                Ok(()) => println!("Seeded demonstration data in {}", cli.db_path.display()),
                Err(e) => eprintln!("Error seeding data: {e}"),
            }
        }
        Some(Commands::ListUsers { role }) => {
            let role = Role::parse(&role)?;
            let users = db.with_conn(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {}, name, email FROM {} ORDER BY {}",
                    role.id_column(),
                    role.table(),
                    role.id_column(),
                ))?;
                let users = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(users)
            })?;

            if users.is_empty() {
                println!("No {role}s found.");
            } else {
                for (id, name, email) in users {
                    println!("ID: {id}, Name: {name}, Email: {email}");
                }
            }
        }
        None => {
            println!("Use 'medilink --help' for commands");
        }
    }

    Ok(())
}

/// Mirrors the demonstration data the original deployment shipped with: three
/// patients across two doctors, two pharmacies, one message thread, and one
/// prescription of each duration type.
fn seed(db: Arc<Db>) -> Result<(), Box<dyn std::error::Error>> {
    let auth = AuthService::new(db.clone());
    let vault = MessageVault::new(db.clone(), MessageCipher::new(DEFAULT_MESSAGE_KEY));
    let ledger = PrescriptionLedger::new(db);

    let ieiri = auth.register(
        Role::Doctor,
        Registration {
            name: NonEmptyText::new("Dr. Shoko Ieiri")?,
            email: EmailAddress::parse("doctor1@example.com")?,
            password: NonEmptyText::new("qwerty")?,
            date_of_birth: None,
            doctor_id: None,
            patient_history: None,
            specialisation: Some("Reversed Cursed Technique".into()),
        },
    )?;
    let house = auth.register(
        Role::Doctor,
        Registration {
            name: NonEmptyText::new("Dr. Gregory House")?,
            email: EmailAddress::parse("doctor2@example.com")?,
            password: NonEmptyText::new("password")?,
            date_of_birth: None,
            doctor_id: None,
            patient_history: None,
            specialisation: None,
        },
    )?;

    let madarame = auth.register(
        Role::Patient,
        Registration {
            name: NonEmptyText::new("Baku Madarame")?,
            email: EmailAddress::parse("patient1@example.com")?,
            password: NonEmptyText::new("password123")?,
            date_of_birth: Some("1970-01-01".into()),
            doctor_id: Some(ieiri.user_id().to_owned()),
            patient_history: Some(serde_json::json!({
                "allergies": ["N/A"],
                "past_illnesses": ["Gambling Addiction"],
                "surgeries": ["ocular surgery"],
                "family_history": {"diabetes": false, "heart_disease": true}
            })),
            specialisation: None,
        },
    )?;
    let kiruma = auth.register(
        Role::Patient,
        Registration {
            name: NonEmptyText::new("Souichi Kiruma")?,
            email: EmailAddress::parse("patient2@example.com")?,
            password: NonEmptyText::new("password456")?,
            date_of_birth: Some("1970-02-02".into()),
            doctor_id: Some(house.user_id().to_owned()),
            patient_history: Some(serde_json::json!({
                "allergies": ["N/A"],
                "past_illnesses": ["Periodic Amnesia"],
                "surgeries": ["N/A"],
                "family_history": {"diabetes": false, "heart_disease": false}
            })),
            specialisation: None,
        },
    )?;
    auth.register(
        Role::Patient,
        Registration {
            name: NonEmptyText::new("Takaomi Kaji")?,
            email: EmailAddress::parse("patient3@example.com")?,
            password: NonEmptyText::new("password789")?,
            date_of_birth: Some("1970-03-03".into()),
            doctor_id: Some(house.user_id().to_owned()),
            patient_history: None,
            specialisation: None,
        },
    )?;

    let medicare = auth.register(
        Role::Pharmacist,
        Registration {
            name: NonEmptyText::new("MediCare Pharmacy")?,
            email: EmailAddress::parse("pharmacy1@example.com")?,
            password: NonEmptyText::new("asdfghjkl;")?,
            date_of_birth: None,
            doctor_id: None,
            patient_history: None,
            specialisation: None,
        },
    )?;
    let healthplus = auth.register(
        Role::Pharmacist,
        Registration {
            name: NonEmptyText::new("HealthPlus Pharmacy")?,
            email: EmailAddress::parse("pharmacy2@example.com")?,
            password: NonEmptyText::new("pingpong")?,
            date_of_birth: None,
            doctor_id: None,
            patient_history: None,
            specialisation: None,
        },
    )?;

    vault.append_message(
        ieiri.user_id(),
        madarame.user_id(),
        ieiri.user_id(),
        "Your latest bloodwork looks fine.",
        "2024-01-15T10:00:00",
    )?;
    vault.append_message(
        ieiri.user_id(),
        madarame.user_id(),
        madarame.user_id(),
        "Thank you, doctor.",
        "2024-01-15T10:05:00",
    )?;

    ledger.create(NewPrescription {
        prescription_id: Some("RX00001".into()),
        patient_id: madarame.user_id().to_owned(),
        doctor_id: ieiri.user_id().to_owned(),
        pharm_id: medicare.user_id().to_owned(),
        medicine_name: "Medicine A, Medicine B".into(),
        instructions: Some("Take twice daily after meals".into()),
        date_prescribed: "2025-12-11".into(),
        duration_type: DurationType::Lifetime,
        collection_code: Some("123456".into()),
    })?;
    ledger.create(NewPrescription {
        prescription_id: Some("RX00002".into()),
        patient_id: kiruma.user_id().to_owned(),
        doctor_id: house.user_id().to_owned(),
        pharm_id: healthplus.user_id().to_owned(),
        medicine_name: "Medicine C".into(),
        instructions: Some("Take once daily before bed".into()),
        date_prescribed: "2025-06-30".into(),
        duration_type: DurationType::Temporary,
        collection_code: Some("654321".into()),
    })?;

    Ok(())
}
