// Демонстрационный бинарь: поднимает базу, заливает немного данных
// и показывает скоринг с "горячим" списком.

use anyhow::Result;
use log::info;

use callerdb::{CallerDb, ContactInput, RegisterInput, SearchType, SpamReason, SpamReportInput};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let path = std::env::var("CALLERDB_PATH").unwrap_or_else(|_| "callerdb.sqlite3".to_string());
    let db = CallerDb::open(&path).await?;
    info!("database ready at {}", path);

    // Если пользователи уже есть (повторный запуск) — просто логинимся
    let alice = match db
        .register(RegisterInput {
            name: "Alice Johnson".to_string(),
            phone_number: "+12345678901".to_string(),
            email: Some("alice.johnson@email.com".to_string()),
            password: "Passw0rd1".to_string(),
        })
        .await
    {
        Ok(out) => out.user,
        Err(_) => db.login("+12345678901", "Passw0rd1").await?.user,
    };
    let bob = match db
        .register(RegisterInput {
            name: "Bob Wilson".to_string(),
            phone_number: "+12345678902".to_string(),
            email: None,
            password: "Passw0rd1".to_string(),
        })
        .await
    {
        Ok(out) => out.user,
        Err(_) => db.login("+12345678902", "Passw0rd1").await?.user,
    };

    if db
        .add_contact(
            &bob,
            ContactInput {
                name: "Alice".to_string(),
                phone_number: alice.phone_number.clone(),
                email: None,
            },
        )
        .await
        .is_ok()
    {
        info!("seeded bob's contact book");
    }

    let robocaller = "+18005551234";
    for reporter in [&alice, &bob] {
        let _ = db
            .report_spam(
                reporter,
                SpamReportInput {
                    phone_number: robocaller.to_string(),
                    reason: SpamReason::Robocall,
                    description: Some("prerecorded warranty offer".to_string()),
                },
            )
            .await;
    }

    let check = db.check_number(&alice, robocaller).await?;
    println!(
        "{}: likelihood {}%, risk {}",
        check.phone_number,
        check.spam_likelihood,
        check.risk_level.as_str()
    );

    let found = db
        .search(&bob, &alice.phone_number, SearchType::Phone, 1, 20)
        .await?;
    for r in &found.results {
        println!("search hit: {} ({})", r.name, r.phone_number);
    }

    println!("trending spam numbers:");
    for item in db.trending().await? {
        println!(
            "  {} — {} report(s), likelihood {}%",
            item.phone_number, item.report_count, item.spam_likelihood
        );
    }

    Ok(())
}
