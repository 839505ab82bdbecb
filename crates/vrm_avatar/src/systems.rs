use bevy::{
    ecs::prelude::*,
    log::{debug, warn},
    tasks::{AsyncComputeTaskPool, block_on, futures_lite::future},
    time::Time,
    transform::components::Transform,
};

use crate::{
    components::{AvatarBinding, AvatarExpressionWeights},
    resources::{Avatars, MotionLoads, SharedMotionLoader},
};

/// Starts a background load for every clip an avatar asked for
pub fn spawn_motion_loads(
    mut avatars: ResMut<Avatars>,
    loader: Res<SharedMotionLoader>,
    mut loads: ResMut<MotionLoads>,
) {
    let pool = AsyncComputeTaskPool::get();
    for pending in avatars.take_load_requests() {
        debug!(
            "Loading {} for {} in the background",
            pending.request.file, pending.character
        );
        let loader = loader.0.clone();
        let file = pending.request.file.clone();
        let rig = pending.rig.clone();
        let options = pending.options.clone();
        let task = pool.spawn(async move { loader.load(&file, &rig, &options).await });
        loads.tasks.push((pending, task));
    }
}

/// Hands finished loads back to the avatars
pub fn poll_motion_loads(mut avatars: ResMut<Avatars>, mut loads: ResMut<MotionLoads>) {
    let mut still_running = Vec::with_capacity(loads.tasks.len());
    for (pending, mut task) in loads.tasks.drain(..) {
        match block_on(future::poll_once(&mut task)) {
            Some(result) => avatars.on_clip_loaded(&pending, result),
            None => still_running.push((pending, task)),
        }
    }
    loads.tasks = still_running;
}

/// Timers, expressions, mixer and overlay, for every avatar
pub fn drive_avatars(time: Res<Time>, mut avatars: ResMut<Avatars>) {
    avatars.update(time.delta_secs());
}

/// Writes avatar poses to the bound entities
pub fn apply_avatar_poses(
    avatars: Res<Avatars>,
    bindings: Query<(Entity, &AvatarBinding)>,
    mut transforms: Query<&mut Transform>,
) {
    for (entity, binding) in &bindings {
        let Some(avatar) = avatars.get(&binding.character) else {
            warn!(
                "Entity {entity} is bound to {}, which has no avatar",
                binding.character
            );
            continue;
        };

        let rig = avatar.rig();
        if let Ok(mut root) = transforms.get_mut(entity) {
            *root = *rig.root();
        }

        for (node, bone) in &binding.bones {
            let Some(local) = rig.skeleton().local(*node) else {
                continue;
            };
            if let Ok(mut transform) = transforms.get_mut(*bone) {
                transform.translation = local.translation;
                transform.rotation = local.rotation;
            }
        }
    }
}

pub fn sync_expression_weights(
    avatars: Res<Avatars>,
    mut bindings: Query<(&AvatarBinding, &mut AvatarExpressionWeights)>,
) {
    for (binding, mut expressions) in &mut bindings {
        let Some(avatar) = avatars.get(&binding.character) else {
            continue;
        };
        expressions.weights.clear();
        expressions.weights.extend(
            avatar
                .expressions()
                .weights()
                .map(|(name, weight)| (name.to_string(), weight)),
        );
    }
}
