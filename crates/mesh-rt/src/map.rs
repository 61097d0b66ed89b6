//! Heap maps: `{ len: u64, cap: u64, key_type_tag: u64 }` header
//! followed by `[key, value]` pair slots.
//!
//! `key_type_tag`: 0 = Int keys (compared by word), 1 = String keys
//! (compared by content with an intern-free byte equality routine).
//! The tag is fixed by the constructor; `Map.from_list` does not infer
//! it.

use crate::gc;
use crate::list::{MeshList, alloc_list, mesh_list_len, mesh_list_nth, push_raw};
use crate::string::MeshString;
use crate::tuple;

pub const KEY_INT: u64 = 0;
pub const KEY_STRING: u64 = 1;

#[repr(C)]
pub struct MeshMap {
    pub len: u64,
    pub cap: u64,
    pub key_type_tag: u64,
    // [key, value] pairs follow inline
}

fn alloc_map(cap: usize, key_tag: u64) -> *mut MeshMap {
    let cap = cap.max(4);
    unsafe {
        let ptr = gc::mesh_gc_alloc_actor(24 + (cap * 16) as u64, 8) as *mut MeshMap;
        (*ptr).len = 0;
        (*ptr).cap = cap as u64;
        (*ptr).key_type_tag = key_tag;
        ptr
    }
}

unsafe fn pairs<'a>(map: *const MeshMap) -> &'a [[u64; 2]] {
    unsafe {
        let data = (map as *const u8).add(24) as *const [u64; 2];
        std::slice::from_raw_parts(data, (*map).len as usize)
    }
}

unsafe fn pairs_mut<'a>(map: *mut MeshMap) -> &'a mut [[u64; 2]] {
    unsafe {
        let data = (map as *mut u8).add(24) as *mut [u64; 2];
        std::slice::from_raw_parts_mut(data, (*map).cap as usize)
    }
}

unsafe fn keys_equal(tag: u64, a: u64, b: u64) -> bool {
    if tag == KEY_STRING {
        unsafe {
            crate::string::mesh_string_eq(a as *const MeshString, b as *const MeshString) != 0
        }
    } else {
        a == b
    }
}

unsafe fn find(map: *const MeshMap, key: u64) -> Option<usize> {
    unsafe {
        let tag = (*map).key_type_tag;
        pairs(map)
            .iter()
            .position(|&[k, _]| keys_equal(tag, k, key))
    }
}

/// Insert or update; returns the (possibly relocated) map.
unsafe fn insert_raw(map: *mut MeshMap, key: u64, value: u64) -> *mut MeshMap {
    unsafe {
        if let Some(i) = find(map, key) {
            pairs_mut(map)[i][1] = value;
            return map;
        }
        let map = if (*map).len == (*map).cap {
            let grown = alloc_map(((*map).cap as usize) * 2, (*map).key_type_tag);
            (*grown).len = (*map).len;
            let src = pairs(map);
            pairs_mut(grown)[..src.len()].copy_from_slice(src);
            grown
        } else {
            map
        };
        let idx = (*map).len as usize;
        pairs_mut(map)[idx] = [key, value];
        (*map).len += 1;
        map
    }
}

/// An Int-keyed map.
#[unsafe(no_mangle)]
pub extern "C-unwind" fn mesh_map_new() -> *mut MeshMap {
    alloc_map(4, KEY_INT)
}

/// A String-keyed map; the dedicated constructor fixes the key tag.
#[unsafe(no_mangle)]
pub extern "C-unwind" fn mesh_map_new_str() -> *mut MeshMap {
    alloc_map(4, KEY_STRING)
}

/// Build an Int-keyed map from a list of 2-tuples.
///
/// # Safety
/// `list` must be a valid list of tuple pointers.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn mesh_map_from_list(list: *const MeshList) -> *mut MeshMap {
    unsafe {
        let n = mesh_list_len(list);
        let mut map = alloc_map(n.max(1) as usize, KEY_INT);
        for i in 0..n {
            let pair = mesh_list_nth(list, i) as *const u8;
            let key = tuple::mesh_tuple_nth(pair, 0);
            let value = tuple::mesh_tuple_nth(pair, 1);
            map = insert_raw(map, key, value);
        }
        map
    }
}

/// # Safety
/// `map` must be a valid map object.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn mesh_map_len(map: *const MeshMap) -> i64 {
    unsafe { (*map).len as i64 }
}

/// Lookup returning an Option value.
///
/// # Safety
/// `map` must be a valid map object.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn mesh_map_get(map: *const MeshMap, key: u64) -> *mut u8 {
    unsafe {
        match find(map, key) {
            Some(i) => crate::variant::alloc_some(pairs(map)[i][1]),
            None => crate::variant::alloc_none(),
        }
    }
}

/// # Safety
/// `map` must be a valid map object.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn mesh_map_insert(
    map: *mut MeshMap,
    key: u64,
    value: u64,
) -> *mut MeshMap {
    unsafe { insert_raw(map, key, value) }
}

/// # Safety
/// `map` must be a valid map object.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn mesh_map_remove(map: *mut MeshMap, key: u64) -> *mut MeshMap {
    unsafe {
        let tag = (*map).key_type_tag;
        let out = alloc_map((*map).len as usize, tag);
        let mut out_ptr = out;
        for &[k, v] in pairs(map) {
            if !keys_equal(tag, k, key) {
                out_ptr = insert_raw(out_ptr, k, v);
            }
        }
        out_ptr
    }
}

/// # Safety
/// `map` must be a valid map object.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn mesh_map_contains_key(map: *const MeshMap, key: u64) -> u8 {
    unsafe { find(map, key).is_some() as u8 }
}

/// Merge two maps; `b`'s entries win on duplicate keys.
///
/// # Safety
/// Both maps must be valid and share a key tag.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn mesh_map_merge(
    a: *const MeshMap,
    b: *const MeshMap,
) -> *mut MeshMap {
    unsafe {
        let tag = (*a).key_type_tag;
        let mut out = alloc_map(((*a).len + (*b).len).max(1) as usize, tag);
        for &[k, v] in pairs(a) {
            out = insert_raw(out, k, v);
        }
        for &[k, v] in pairs(b) {
            out = insert_raw(out, k, v);
        }
        out
    }
}

/// The entries as a list of 2-tuples, in insertion order.
///
/// # Safety
/// `map` must be a valid map object.
#[unsafe(no_mangle)]
pub unsafe extern "C-unwind" fn mesh_map_to_list(map: *const MeshMap) -> *mut MeshList {
    unsafe {
        let mut out = alloc_list((*map).len as usize);
        for &[k, v] in pairs(map) {
            let pair = tuple::alloc_tuple(&[k, v]);
            out = push_raw(out, pair as u64);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::string::alloc_str;

    #[test]
    fn int_keyed_insert_get() {
        unsafe {
            let mut m = mesh_map_new();
            m = mesh_map_insert(m, 1, 100);
            m = mesh_map_insert(m, 2, 200);
            m = mesh_map_insert(m, 1, 111);
            assert_eq!(mesh_map_len(m), 2);
            let got = mesh_map_get(m, 1);
            assert_eq!(crate::variant::mesh_option_unwrap_or(got, 0), 111);
            assert_eq!(crate::variant::mesh_option_is_none(mesh_map_get(m, 9)), 1);
        }
    }

    #[test]
    fn string_keys_compare_by_content() {
        unsafe {
            let mut m = mesh_map_new_str();
            let k1 = alloc_str("level");
            let k2 = alloc_str("level");
            m = mesh_map_insert(m, k1 as u64, 1);
            // A different allocation with the same bytes hits the same
            // entry.
            m = mesh_map_insert(m, k2 as u64, 2);
            assert_eq!(mesh_map_len(m), 1);
            assert_eq!(
                crate::variant::mesh_option_unwrap_or(mesh_map_get(m, k2 as u64), 0),
                2
            );
        }
    }

    #[test]
    fn merge_prefers_right_side() {
        unsafe {
            let mut a = mesh_map_new();
            a = mesh_map_insert(a, 1, 10);
            a = mesh_map_insert(a, 2, 20);
            let mut b = mesh_map_new();
            b = mesh_map_insert(b, 2, 99);
            let merged = mesh_map_merge(a, b);
            assert_eq!(
                crate::variant::mesh_option_unwrap_or(mesh_map_get(merged, 2), 0),
                99
            );
            assert_eq!(mesh_map_len(merged), 2);
        }
    }

    #[test]
    fn to_list_yields_pairs() {
        unsafe {
            let mut m = mesh_map_new();
            m = mesh_map_insert(m, 7, 70);
            let l = mesh_map_to_list(m);
            assert_eq!(mesh_list_len(l), 1);
            let pair = mesh_list_nth(l, 0) as *const u8;
            assert_eq!(tuple::mesh_tuple_nth(pair, 0), 7);
            assert_eq!(tuple::mesh_tuple_nth(pair, 1), 70);
        }
    }
}
