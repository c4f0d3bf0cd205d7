//! `address_role_resolver`: LLM-assisted. Produces the final
//! `AddressParticipant` list by combining deterministic evidence (ENS name,
//! known protocol/token match, EOA vs. contract) with a model-authored
//! free-form `role` phrase for each address.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;

use crate::error::Result;
use crate::keys;
use crate::result::{AddressParticipant, ParticipantCategory, ParticipantKind};
use crate::tool::{Tool, ToolContext};
use crate::tools::protocol_resolver::Protocol;
use crate::tools::tx_context::TxContext;
use crate::transfer::TokenTransfer;

#[derive(Default)]
pub struct AddressRoleResolver;

impl AddressRoleResolver {
    pub fn new() -> Self {
        Self
    }
}

fn collect_addresses(tx_context: &Option<TxContext>, transfers: &[TokenTransfer], protocols: &[Protocol]) -> HashSet<String> {
    let mut addresses = HashSet::new();
    if let Some(tx_context) = tx_context {
        if let Some(from) = &tx_context.from {
            addresses.insert(from.to_lowercase());
        }
        if let Some(to) = &tx_context.to {
            addresses.insert(to.to_lowercase());
        }
    }
    for transfer in transfers {
        addresses.insert(transfer.from.to_lowercase());
        addresses.insert(transfer.to.to_lowercase());
        if !transfer.contract.is_empty() {
            addresses.insert(transfer.contract.to_lowercase());
        }
    }
    for protocol in protocols {
        addresses.insert(protocol.address.to_lowercase());
    }
    addresses.remove("");
    addresses
}

fn build_prompt(addresses: &[String], protocols: &[Protocol]) -> String {
    let mut out = String::from(
        "For each address below, write a short free-form role phrase (e.g. \"token owner\", \
         \"lending pool\", \"swap router\"). Respond with a JSON array of objects shaped \
         {\"address\": string, \"role\": string, \"category\": \"user\"|\"protocol\"|\"token\"|\"unknown\"}.\n\n",
    );
    for address in addresses {
        let known = protocols.iter().find(|p| p.address.eq_ignore_ascii_case(address));
        match known {
            Some(p) => out.push_str(&format!("- {address} (known protocol: {})\n", p.name)),
            None => out.push_str(&format!("- {address}\n")),
        }
    }
    out
}

fn parse_llm_roles(value: &serde_json::Value) -> HashMap<String, (String, ParticipantCategory)> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let address = item.get("address")?.as_str()?.to_lowercase();
                    let role = item.get("role")?.as_str()?.to_string();
                    let category = match item.get("category").and_then(|v| v.as_str()) {
                        Some("user") => ParticipantCategory::User,
                        Some("protocol") => ParticipantCategory::Protocol,
                        Some("token") => ParticipantCategory::Token,
                        _ => ParticipantCategory::Unknown,
                    };
                    Some((address, (role, category)))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Tool for AddressRoleResolver {
    fn name(&self) -> &'static str {
        "address_role_resolver"
    }

    fn description(&self) -> &'static str {
        "assigns a human-readable role to every address involved"
    }

    fn dependencies(&self) -> &'static [&'static str] {
        &[keys::TX_CONTEXT, keys::TRANSFERS, keys::PROTOCOLS, keys::ENS_MAP]
    }

    fn writes(&self) -> &'static [&'static str] {
        &[keys::PARTICIPANTS]
    }

    async fn process(&self, ctx: &ToolContext) -> Result<()> {
        let tx_context: Option<TxContext> = ctx.baggage.get(keys::TX_CONTEXT);
        let transfers: Vec<TokenTransfer> = ctx.baggage.get(keys::TRANSFERS).unwrap_or_default();
        let protocols: Vec<Protocol> = ctx.baggage.get(keys::PROTOCOLS).unwrap_or_default();
        let ens_map: HashMap<String, String> = ctx.baggage.get(keys::ENS_MAP).unwrap_or_default();

        let addresses: Vec<String> = collect_addresses(&tx_context, &transfers, &protocols).into_iter().collect();
        if addresses.is_empty() {
            return ctx.baggage.set(keys::PARTICIPANTS, Vec::<AddressParticipant>::new());
        }

        let roles = match ctx
            .llm
            .complete_json("address_role_resolver", None, &build_prompt(&addresses, &protocols), None)
            .await
        {
            Ok((value, _diag)) => parse_llm_roles(&value),
            Err(_) => HashMap::new(),
        };

        let mut participants = Vec::with_capacity(addresses.len());
        for address in addresses {
            let known_protocol = protocols.iter().find(|p| p.address.eq_ignore_ascii_case(&address));
            let code = ctx.rpc.get_code(&address).await.unwrap_or_else(|_| "0x".to_string());
            let kind = if code == "0x" || code.is_empty() {
                ParticipantKind::Eoa
            } else {
                ParticipantKind::Contract
            };

            let (role, category) = match roles.get(&address) {
                Some((role, category)) => (role.clone(), *category),
                None if known_protocol.is_some() => {
                    (format!("{} contract", known_protocol.unwrap().kind), ParticipantCategory::Protocol)
                }
                None => ("participant".to_string(), ParticipantCategory::Unknown),
            };

            participants.push(AddressParticipant {
                address: address.clone(),
                role,
                category,
                kind,
                ens_name: ens_map.get(&address).cloned(),
                name: known_protocol.map(|p| p.name.clone()),
                icon: None,
                link: None,
                description: None,
                metadata: None,
            });
        }

        ctx.baggage.set(keys::PARTICIPANTS, participants)
    }

    fn prompt_context(&self, ctx: &ToolContext) -> Option<String> {
        let participants: Vec<AddressParticipant> = ctx.baggage.get(keys::PARTICIPANTS)?;
        if participants.is_empty() {
            return None;
        }
        let mut out = format!("### PARTICIPANTS ({}):\n", participants.len());
        for p in participants.iter().take(20) {
            out.push_str(&format!("- {}: {}\n", p.address, p.role));
        }
        Some(out)
    }
}
