use crate::console::{cancel_task, CancelOutcome, TaskId};
use crate::error::ConsoleError;
use crate::transport::{AuthClient, AuthUser, Provider};
use crate::ui::{KeyValue, MessageBlock, NoticeLevel, PlainRenderer, Renderer, TableSpec};
use crate::TargetArgs;

use super::{buffered_renderer, rendered_text, Prepared};

pub(super) fn run_cancel(target: &TargetArgs) -> Result<String, ConsoleError> {
    let prepared = Prepared::load(target, false)?;
    let task = TaskId::from_page(&prepared.page)?;
    let url = prepared.page.cancel_url(&task)?;
    let http = prepared.http();

    let spinner =
        PlainRenderer::stderr(prepared.mode).spinner(&format!("cancelling task {task}"))?;
    let outcome = cancel_task(&http, &task, &url);
    match &outcome {
        Ok(_) => spinner.finish_success("cancel request sent"),
        Err(_) => spinner.finish_error("cancel request failed"),
    }

    let mut renderer = buffered_renderer(prepared.stdout_color());
    render_cancel(&mut renderer, &task, outcome?)?;
    rendered_text(renderer)
}

fn render_cancel<R: Renderer>(
    renderer: &mut R,
    task: &TaskId,
    outcome: CancelOutcome,
) -> Result<(), ConsoleError> {
    match outcome {
        CancelOutcome::Accepted => renderer.success_block(&MessageBlock::new(
            "Cancel requested",
            format!("Task {task} has been marked for deletion"),
        ))?,
        CancelOutcome::Unconfirmed { status } => renderer.notice(
            NoticeLevel::Warning,
            &format!("cancel request for task {task} returned HTTP {status}; state unknown"),
        )?,
    }
    Ok(())
}

pub(super) fn run_providers(target: &TargetArgs) -> Result<String, ConsoleError> {
    let prepared = Prepared::load(target, false)?;
    let auth = AuthClient::new(prepared.http(), prepared.page.clone());
    let providers = auth.provider_links()?;
    let mut logout_urls = Vec::with_capacity(providers.len());
    for provider in &providers {
        logout_urls.push(auth.logout_url(&provider.name)?.to_string());
    }

    let mut renderer = buffered_renderer(prepared.stdout_color());
    render_providers(&mut renderer, &providers, &logout_urls)?;
    rendered_text(renderer)
}

fn render_providers<R: Renderer>(
    renderer: &mut R,
    providers: &[Provider],
    logout_urls: &[String],
) -> Result<(), ConsoleError> {
    renderer.section("Login providers")?;
    let rows = providers
        .iter()
        .zip(logout_urls)
        .map(|(provider, logout)| {
            vec![
                provider.name.clone(),
                provider.site_id.clone(),
                provider.login_url.clone(),
                logout.clone(),
            ]
        })
        .collect::<Vec<_>>();
    renderer.table(&TableSpec::new(
        vec![
            "provider".to_owned(),
            "site".to_owned(),
            "login".to_owned(),
            "logout".to_owned(),
        ],
        rows,
    ))?;
    Ok(())
}

pub(super) fn run_whoami(target: &TargetArgs) -> Result<String, ConsoleError> {
    let prepared = Prepared::load(target, false)?;
    let auth = AuthClient::new(prepared.http(), prepared.page.clone());
    let user = auth.current_user()?;

    let mut renderer = buffered_renderer(prepared.stdout_color());
    render_user(&mut renderer, user.as_ref())?;
    rendered_text(renderer)
}

fn render_user<R: Renderer>(
    renderer: &mut R,
    user: Option<&AuthUser>,
) -> Result<(), ConsoleError> {
    let Some(user) = user else {
        renderer.notice(NoticeLevel::Info, "not logged in")?;
        return Ok(());
    };
    let mut items = vec![KeyValue::new("name", &user.name), KeyValue::new("id", &user.id)];
    if let Some(email) = &user.email {
        items.push(KeyValue::new("email", email));
    }
    if let Some(picture) = &user.picture {
        items.push(KeyValue::new("picture", picture));
    }
    renderer.section("Logged in")?;
    renderer.key_values(&items)?;
    Ok(())
}
