use clap::{Parser, Subcommand};
use dialoguer::{Input, Password};
use dotenvy::dotenv;

use rollcall_core::{HashScheme, hash_password};
use rollcall_db::{PgPool, init_db_pool};
use rollcall_models::{Role, SubjectId};

#[derive(Parser)]
#[command(name = "rollcall-cli")]
#[command(about = "Rollcall CLI - Account administration for Rollcall", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account (the first administrator has to be created here)
    CreateUser {
        /// UIN of the new account
        #[arg(short = 'u', long)]
        uin: Option<String>,

        /// student, teacher or admin
        #[arg(short = 'r', long, default_value = "admin")]
        role: Role,

        /// Password (will be prompted securely if not provided)
        #[arg(short = 'p', long)]
        password: Option<String>,
    },
    /// Print a bcrypt hash for a password, e.g. for manual repairs
    HashPassword,
    /// Count stored password hashes by scheme
    HashReport,
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::CreateUser {
            uin,
            role,
            password,
        } => {
            let pool = connect().await;
            handle_create_user(&pool, uin, role, password).await
        }
        Commands::HashPassword => handle_hash_password(),
        Commands::HashReport => {
            let pool = connect().await;
            handle_hash_report(&pool).await
        }
    }
}

async fn connect() -> PgPool {
    init_db_pool().await.unwrap_or_else(|e| {
        eprintln!("❌ Failed to connect to database: {:#}", e);
        std::process::exit(1);
    })
}

fn prompt_password() -> String {
    Password::new()
        .with_prompt("Password")
        .with_confirmation("Confirm password", "Passwords don't match")
        .interact()
        .expect("Failed to read password")
}

async fn handle_create_user(
    pool: &PgPool,
    uin: Option<String>,
    role: Role,
    password: Option<String>,
) {
    let uin = uin.unwrap_or_else(|| {
        Input::new()
            .with_prompt("UIN")
            .interact_text()
            .expect("Failed to read UIN")
    });
    let subject_id = match SubjectId::parse(uin.trim()) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("❌ Invalid UIN: {}", e);
            std::process::exit(1);
        }
    };

    let password = password.unwrap_or_else(prompt_password);

    match create_user(pool, &subject_id, role, &password).await {
        Ok(true) => {
            println!("\n✅ User created successfully!");
            println!("   UIN: {}", subject_id);
            println!("   Role: {}", role);
        }
        Ok(false) => {
            eprintln!("\n❌ UIN {} is already registered", subject_id);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("\n❌ Error creating user: {}", e);
            std::process::exit(1);
        }
    }
}

fn handle_hash_password() {
    let password = prompt_password();
    match hash_password(&password) {
        Ok(hash) => println!("{}", hash),
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }
}

async fn handle_hash_report(pool: &PgPool) {
    let hashes: Vec<String> = match sqlx::query_scalar("SELECT password FROM users")
        .fetch_all(pool)
        .await
    {
        Ok(hashes) => hashes,
        Err(e) => {
            eprintln!("❌ Failed to read users: {}", e);
            std::process::exit(1);
        }
    };

    let (mut bcrypt, mut legacy, mut unknown) = (0usize, 0usize, 0usize);
    for hash in &hashes {
        match HashScheme::detect(hash) {
            HashScheme::Bcrypt => bcrypt += 1,
            HashScheme::LegacySha256 => legacy += 1,
            HashScheme::Unknown => unknown += 1,
        }
    }

    println!("bcrypt:         {}", bcrypt);
    println!("legacy sha-256: {} (rotated on next login)", legacy);
    println!("unrecognised:   {} (cannot log in)", unknown);
}

/// Returns `false` when the UIN already exists.
async fn create_user(
    db: &PgPool,
    subject_id: &SubjectId,
    role: Role,
    password: &str,
) -> Result<bool, Box<dyn std::error::Error>> {
    let hashed_password = hash_password(password).map_err(|e| e.error.to_string())?;

    let result = sqlx::query(
        "INSERT INTO users (uin, password, role)
         VALUES ($1, $2, $3)
         ON CONFLICT (uin) DO NOTHING",
    )
    .bind(subject_id)
    .bind(&hashed_password)
    .bind(role.as_str())
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}
