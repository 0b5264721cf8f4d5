//! Roundcube webmail.

use super::publish;
use crate::context::{Providers, StackContext};
use crate::database::Database;
use crate::install::{Placement, ServiceInstall, ServiceTasks};
use crate::records::service_cname;
use crate::server::Instance;
use crate::source::Source;
use mailstack_core::{TaskGraph, TaskId, Value};

pub const DATABASE: &str = "roundcube";

pub fn add(
    graph: &mut TaskGraph,
    ctx: &StackContext,
    providers: &Providers,
    instance: &Instance,
    database: &Database,
    mailcow_api_key: &Value,
    after: &[TaskId],
) -> anyhow::Result<ServiceTasks> {
    let settings = &ctx.settings;
    let domain = &settings.roundcube.domain;
    let user = database.user(DATABASE)?;
    let asset = |file: &str| ctx.asset("roundcube", file);

    publish(graph, [service_cname(settings, domain)], &providers.dns)?;

    let custom = Source::template(
        asset("custom.inc.php.j2"),
        [
            ("mailname", Value::literal(ctx.mailname())),
            ("domain", Value::literal(domain.name.clone())),
            ("db.host", Value::literal(ctx.postgres.address.clone())),
            ("db.database", Value::literal(DATABASE)),
            ("db.user", Value::literal(DATABASE)),
            ("db.password", user.password.clone()),
        ],
    );
    let password_plugin = Source::template(
        asset("password.inc.php.j2"),
        [
            ("mailname", Value::literal(ctx.mailname())),
            ("apiToken", mailcow_api_key.clone()),
        ],
    );

    let mut after = after.to_vec();
    after.extend(database.ready(DATABASE, DATABASE));

    ServiceInstall::new("roundcube", ctx, providers, &instance.remote)
        .after(&after)
        .compose("webmail", [("domain", Value::literal(domain.name.clone()))])
        .config(Placement::new(
            "nginx.conf",
            Source::Asset(asset("nginx.conf")),
            "/opt/roundcube/nginx.conf",
        ))
        .config(
            Placement::new("custom.inc.php", custom, "/opt/roundcube/config/custom.inc.php")
                .mirrored(),
        )
        .systemd()
        .install_template([])
        .postinstall_file(
            Placement::new(
                "password.inc.php",
                password_plugin,
                "/opt/roundcube/www/plugins/password/config.inc.php",
            )
            .mirrored(),
        )
        .build(graph)
}
