//! The svcctl command set
//!
//! Every leaf is a [`Command`] over its own options aggregate, generic over
//! the [`DepsFactory`] so the binary and the tests can inject different
//! backends.

mod curl;
mod delete;
mod deploy;
mod list;
mod secret;
mod service_account;

use std::rc::Rc;

use crate::command::{CommandNode, CommandTree};
use crate::deps::DepsFactory;

pub use curl::{new_curl_cmd, CurlOptions};
pub use delete::{
    new_delete_secret_cmd, new_delete_service_account_cmd, new_delete_service_cmd, DeleteSecretOptions,
    DeleteServiceAccountOptions, DeleteServiceOptions,
};
pub use deploy::{new_deploy_cmd, DeployOptions};
pub use list::{new_list_services_cmd, ListServicesOptions};
pub use secret::{new_create_basic_auth_secret_cmd, BasicAuthSecretFlags, CreateBasicAuthSecretOptions, DOCKER_HUB_SERVER};
pub use service_account::{new_create_service_account_cmd, CreateServiceAccountOptions, ServiceAccountCreateFlags};

/// Assemble the full command hierarchy over one shared deps instance.
pub fn build_command_tree<D: DepsFactory + 'static>(deps: Rc<D>) -> CommandTree {
    CommandTree::new("svcctl", "Manage services, secrets and service accounts", env!("CARGO_PKG_VERSION"))
        .add(CommandNode::group(
            "create",
            "Create resources",
            vec![
                CommandNode::leaf(new_create_service_account_cmd(deps.clone())),
                CommandNode::leaf(new_create_basic_auth_secret_cmd(deps.clone())),
            ],
        ))
        .add(CommandNode::leaf(new_deploy_cmd(deps.clone())))
        .add(CommandNode::group(
            "delete",
            "Delete resources",
            vec![
                CommandNode::leaf(new_delete_service_cmd(deps.clone())),
                CommandNode::leaf(new_delete_secret_cmd(deps.clone())),
                CommandNode::leaf(new_delete_service_account_cmd(deps.clone())),
            ],
        ))
        .add(CommandNode::group(
            "list",
            "List resources",
            vec![CommandNode::leaf(new_list_services_cmd(deps.clone()))],
        ))
        .add(CommandNode::leaf(new_curl_cmd(deps)))
}
