use crate::*;

use lanchat_services::Role;

#[tokio::test]
async fn peer_takes_over_when_the_hub_leaves() -> Result<()> {
    let port = free_port();

    let mut alice = spawn_hub("alice", port);
    alice.wait_state(LifecycleState::Hub).await?;
    let mut bob = spawn_peer("bob", port);
    bob.wait_state(LifecycleState::Peer).await?;
    bob.expect_admin("user \"alice\" connected").await?;

    alice.stop().await?;

    bob.expect_admin("user \"alice\" disconnected").await?;
    bob.wait_state(LifecycleState::Hub).await?;
    assert_eq!(bob.node.role(), Role::Hub);
    assert!(bob.node.registry().is_empty());

    // The new hub accepts newcomers on the same port.
    let mut carol = spawn_peer("carol", port);
    carol.wait_state(LifecycleState::Peer).await?;
    bob.expect_admin("user \"carol\" connected").await?;

    carol.stop().await?;
    bob.stop().await
}

#[tokio::test]
async fn hub_announces_departures_to_remaining_peers() -> Result<()> {
    let (mut alice, bob, mut carol) = three_node_network(free_port()).await?;

    bob.stop().await?;

    alice.expect_admin("user \"bob\" disconnected").await?;
    carol.expect_admin("user \"bob\" disconnected").await?;
    assert_eq!(alice.node.registry().len(), 1);
    assert_eq!(alice.node.role(), Role::Hub);

    carol.stop().await?;
    alice.stop().await
}
