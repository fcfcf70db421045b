//! Cross-adapter route-table laws: every leg resolves in the token registry,
//! every configured module has a driver, and the Starknet roster stays
//! closed over its own registry.

use chainflow::adapter::Adapter;
use chainflow::config::KNOWN_MODULES;
use chainflow::runner::adapter_for;
use chainflow::starknet::amm::amm_by_module;
use chainflow::starknet::stark_token;
use chainflow::tokens::TokenRegistry;

#[test]
fn every_evm_route_table_closes_over_the_registry() {
    let tokens = TokenRegistry::bootstrap();
    for module in KNOWN_MODULES {
        if let Some(adapter) = adapter_for(module) {
            adapter
                .route_table()
                .verify_closure(&tokens)
                .unwrap_or_else(|e| panic!("{module}: {e}"));
        }
    }
}

#[test]
fn every_route_leg_keeps_a_nonempty_destination_list() {
    for module in KNOWN_MODULES {
        if let Some(adapter) = adapter_for(module) {
            for net in adapter.route_table().source_networks() {
                for token in adapter.route_table().source_tokens(net) {
                    assert!(
                        !adapter.route_table().destinations(net, token).is_empty(),
                        "{module}: ({net}, {token}) has no destinations"
                    );
                }
            }
        }
    }
}

#[test]
fn starknet_amm_pairs_resolve_in_the_stark_registry() {
    for module in ["jediswap", "myswap", "10kswap"] {
        let amm = amm_by_module(module).unwrap();
        for (from, to) in amm.pairs() {
            assert!(stark_token(from).is_some(), "{module}: {from} unresolved");
            assert!(stark_token(to).is_some(), "{module}: {to} unresolved");
            assert!(amm.supports(from, to));
        }
    }
}

#[test]
fn module_roster_is_disjoint_between_evm_and_starknet() {
    for module in KNOWN_MODULES {
        let evm = adapter_for(module).is_some();
        let stark = amm_by_module(module).is_some();
        assert!(!(evm && stark), "{module} claimed by both rosters");
    }
}
