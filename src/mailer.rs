// xiqaudit - Telnet exposure audit for ExtremeCloud IQ access points
// Copyright (C) 2025 xiqaudit contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result};
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::fs;
use std::path::Path;

pub const EMAIL_BODY: &str = "See attachment for device report.";

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
}

/// Mail the finished CSV report to all configured recipients over an
/// authenticated STARTTLS session.
pub fn send_report(settings: &EmailSettings, csv_path: &Path) -> Result<()> {
    let message = build_message(settings, csv_path)?;

    let mailer = SmtpTransport::starttls_relay(&settings.smtp_host)
        .context("configuring SMTP relay")?
        .port(settings.smtp_port)
        .credentials(Credentials::new(
            settings.username.clone(),
            settings.password.clone(),
        ))
        .build();

    mailer.send(&message).context("sending email")?;
    Ok(())
}

fn build_message(settings: &EmailSettings, csv_path: &Path) -> Result<Message> {
    let report = fs::read(csv_path)
        .with_context(|| format!("reading report file {}", csv_path.display()))?;
    let report_name = csv_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report.csv".to_string());

    let content_type =
        ContentType::parse("application/octet-stream").context("parsing attachment MIME type")?;
    let attachment = Attachment::new(report_name).body(report, content_type);

    let from: Mailbox = settings
        .from
        .parse()
        .with_context(|| format!("parsing sender address `{}`", settings.from))?;
    let mut builder = Message::builder()
        .from(from)
        .subject(settings.subject.clone());
    for recipient in &settings.to {
        let to: Mailbox = recipient
            .parse()
            .with_context(|| format!("parsing recipient address `{}`", recipient))?;
        builder = builder.to(to);
    }

    builder
        .multipart(
            MultiPart::mixed()
                .singlepart(SinglePart::plain(EMAIL_BODY.to_string()))
                .singlepart(attachment),
        )
        .context("building email message")
}
